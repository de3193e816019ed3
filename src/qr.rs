//! QR code source.
//!
//! The QR symbol is produced outside the crate; the pipeline only needs its
//! image as a data URI to scale into the `qrCode` box.

use std::fs;
use std::path::Path;

use crate::assets::{encode_data_uri, parse_data_uri};
use crate::error::{CertError, Result};

pub trait QrEncoder: Send + Sync {
    /// Encode `text` (the verification URL) as an image data URI.
    fn encode(&self, text: &str) -> Result<String>;
}

/// Serves the same image for every input.
#[derive(Debug, Clone)]
pub struct StaticQr {
    data_uri: String,
}

impl StaticQr {
    pub fn from_data_uri(data_uri: impl Into<String>) -> Result<Self> {
        let data_uri = data_uri.into();
        parse_data_uri(&data_uri).map_err(CertError::Validation)?;
        Ok(Self { data_uri })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            CertError::Validation(format!("cannot read QR image '{}': {e}", path.display()))
        })?;
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
                "image/jpeg"
            }
            _ => "image/png",
        };
        Ok(Self {
            data_uri: encode_data_uri(&bytes, mime),
        })
    }
}

impl QrEncoder for StaticQr {
    fn encode(&self, _text: &str) -> Result<String> {
        Ok(self.data_uri.clone())
    }
}
