//! Error taxonomy shared by every stage of the crate.

use thiserror::Error;

/// Errors produced by certforge.
#[derive(Error, Debug)]
pub enum CertError {
    /// Missing or malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown internal id, public id or template id.
    #[error("{0} not found")]
    NotFound(String),

    /// No template is flagged as the default and none was requested.
    #[error("No default template found")]
    NoDefaultTemplate,

    /// The caller presented no usable identity.
    #[error("Not authorized to access this route")]
    Unauthorized,

    /// The caller's identity lacks the required role or ownership.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate unique value, or a delete blocked by live references.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The certificate exists but has been revoked.
    #[error("Certificate {0} has been revoked by the issuing authority")]
    Revoked(String),

    /// The rendering backend failed or timed out.
    #[error("Render failure: {0}")]
    RenderFailure(String),

    /// Outbound delivery failed. Never surfaced from certificate creation.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl CertError {
    /// HTTP-style status an outer transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            CertError::Validation(_) | CertError::NoDefaultTemplate => 400,
            CertError::Unauthorized => 401,
            CertError::Forbidden(_) => 403,
            CertError::NotFound(_) => 404,
            CertError::Conflict(_) => 409,
            CertError::Revoked(_) => 410,
            CertError::RenderFailure(_) | CertError::Delivery(_) | CertError::Store(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CertError::Validation(_) => "validation_error",
            CertError::NotFound(_) => "not_found",
            CertError::NoDefaultTemplate => "no_default_template",
            CertError::Unauthorized => "unauthorized",
            CertError::Forbidden(_) => "forbidden",
            CertError::Conflict(_) => "conflict",
            CertError::Revoked(_) => "certificate_revoked",
            CertError::RenderFailure(_) => "render_failure",
            CertError::Delivery(_) => "delivery_failure",
            CertError::Store(_) => "store_error",
        }
    }

    /// JSON error body: `{"success": false, "code": ..., "message": ...}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}

impl From<serde_json::Error> for CertError {
    fn from(e: serde_json::Error) -> Self {
        CertError::Validation(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = CertError> = std::result::Result<T, E>;
