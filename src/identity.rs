//! Caller identities. Token verification happens outside this crate; the
//! operations here only consume the resulting [`Identity`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CertError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Issuer,
    Admin,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            organization: None,
            role,
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn is_privileged(&self) -> bool {
        self.role == Role::Admin
    }

    /// Organization name when present, else the display name.
    pub fn issued_by_label(&self) -> &str {
        match self.organization.as_deref() {
            Some(org) if !org.trim().is_empty() => org,
            _ => &self.name,
        }
    }

    /// Fail with `Forbidden` unless the caller holds one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(CertError::Forbidden(format!(
                "User role '{}' is not authorized to access this route",
                self.role_name()
            )))
        }
    }

    /// Fail with `Forbidden` unless the caller is privileged or is `owner`.
    pub fn require_owner_or_admin(&self, owner: Uuid) -> Result<()> {
        if self.is_privileged() || self.id == owner {
            Ok(())
        } else {
            Err(CertError::Forbidden(
                "Not authorized to access this certificate".to_string(),
            ))
        }
    }

    fn role_name(&self) -> &'static str {
        match self.role {
            Role::User => "user",
            Role::Issuer => "issuer",
            Role::Admin => "admin",
        }
    }
}
