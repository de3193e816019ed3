//! Certificate records, public identifier generation and input validation.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CertError, Result};
use crate::identity::Identity;
use crate::template::required;

/// Description used when the creator supplies none.
pub const DEFAULT_DESCRIPTION: &str = "For successfully completing the requirements.";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("static regex is valid")
});

static PUBLIC_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CERT-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{4}$").expect("static regex is valid")
});

/// Generate a public id `CERT-XXXX-XXXX-XXXX` from 6 bytes of OS randomness.
pub fn generate_public_id() -> String {
    let mut bytes = [0u8; 6];
    OsRng.fill_bytes(&mut bytes);
    let hex = hex::encode_upper(bytes);
    format!("CERT-{}-{}-{}", &hex[0..4], &hex[4..8], &hex[8..12])
}

/// Whether `s` has the shape of a public certificate id.
pub fn is_public_id(s: &str) -> bool {
    PUBLIC_ID_RE.is_match(s)
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CertificateStatus {
    #[default]
    Issued,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Issued => "Issued",
            CertificateStatus::Revoked => "Revoked",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Issued" => Ok(CertificateStatus::Issued),
            "Revoked" => Ok(CertificateStatus::Revoked),
            other => Err(CertError::Validation(format!(
                "status must be Issued or Revoked, got '{other}'"
            ))),
        }
    }

    /// `Issued → Revoked` is the only transition; `Revoked` is terminal.
    pub fn can_become(&self, next: CertificateStatus) -> bool {
        *self == next || (*self == CertificateStatus::Issued && next == CertificateStatus::Revoked)
    }
}

/// A stored certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub certificate_id: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub course_title: String,
    pub description: String,
    pub issue_date: DateTime<Utc>,
    pub issuer: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub status: CertificateStatus,
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    pub fn is_revoked(&self) -> bool {
        self.status == CertificateStatus::Revoked
    }
}

/// Body of a certificate creation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificate {
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_email: String,
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

impl NewCertificate {
    pub fn new(
        recipient_name: impl Into<String>,
        recipient_email: impl Into<String>,
        course_title: impl Into<String>,
    ) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            recipient_email: recipient_email.into(),
            course_title: course_title.into(),
            ..Self::default()
        }
    }

    /// Validate the fields and build the record, assigning its public id.
    ///
    /// This is the only place a `certificate_id` is ever generated.
    pub fn into_certificate(self, issuer: &Identity, template_id: Option<Uuid>) -> Result<Certificate> {
        let recipient_name = required("recipient name", self.recipient_name)?;
        let course_title = required("course/event title", self.course_title)?;
        let recipient_email = validate_email(self.recipient_email)?;
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        let now = Utc::now();

        Ok(Certificate {
            id: Uuid::new_v4(),
            certificate_id: generate_public_id(),
            recipient_name,
            recipient_email,
            course_title,
            description,
            issue_date: self.issue_date.unwrap_or(now),
            issuer: issuer.id,
            template_id: template_id.or(self.template_id),
            pdf_url: None,
            status: CertificateStatus::Issued,
            created_at: now,
        })
    }
}

fn validate_email(email: String) -> Result<String> {
    let email = required("recipient email", email)?;
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(CertError::Validation("Please add a valid email".to_string()))
    }
}

/// Partial update of a certificate.
///
/// `certificateId`, `issuer`, `id` and `createdAt` are not patchable; a patch
/// naming them fails to deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CertificatePatch {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub status: Option<CertificateStatus>,
}

impl CertificatePatch {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn revoke() -> Self {
        Self {
            status: Some(CertificateStatus::Revoked),
            ..Self::default()
        }
    }

    /// Apply the patch, validating each touched field.
    pub fn apply(&self, cert: &mut Certificate) -> Result<()> {
        if let Some(name) = &self.recipient_name {
            cert.recipient_name = required("recipient name", name.clone())?;
        }
        if let Some(email) = &self.recipient_email {
            cert.recipient_email = validate_email(email.clone())?;
        }
        if let Some(title) = &self.course_title {
            cert.course_title = required("course/event title", title.clone())?;
        }
        if let Some(description) = &self.description {
            let trimmed = description.trim();
            cert.description = if trimmed.is_empty() {
                DEFAULT_DESCRIPTION.to_string()
            } else {
                trimmed.to_string()
            };
        }
        if let Some(date) = self.issue_date {
            cert.issue_date = date;
        }
        if let Some(template_id) = self.template_id {
            cert.template_id = Some(template_id);
        }
        if let Some(url) = &self.pdf_url {
            cert.pdf_url = Some(url.clone());
        }
        if let Some(status) = self.status {
            if !cert.status.can_become(status) {
                return Err(CertError::Validation(format!(
                    "status cannot change from {} to {}",
                    cert.status.as_str(),
                    status.as_str()
                )));
            }
            cert.status = status;
        }
        Ok(())
    }
}

/// What the public verification endpoint reveals about a certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicView {
    pub valid: bool,
    pub certificate_id: String,
    pub recipient_name: String,
    pub course_title: String,
    pub issue_date: DateTime<Utc>,
    pub issued_by: String,
    pub download_url: String,
}
