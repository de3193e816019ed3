//! Configuration for the rendering pipeline and the certificate service.
//!
//! Everything has a default so the CLI and the tests run with zero
//! configuration; [`ServiceConfig::from_env`] overlays environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed page geometry and rendering knobs.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Page width in layout units (A4 landscape at 96 DPI).
    pub page_width: f32,
    /// Page height in layout units.
    pub page_height: f32,
    /// PDF points per layout unit (72 / 96).
    pub pt_per_unit: f32,
    /// Flat background drawn when the template background cannot be resolved.
    pub fallback_background: String,
    /// Directories searched, in order, for relative asset paths.
    pub asset_roots: Vec<PathBuf>,
    /// Asset names tried, in order, for the signature image.
    pub signature_candidates: Vec<String>,
    /// Upper bound on a single rasterization.
    pub timeout: Duration,
    /// Timed-out workers allowed to linger before new renders are refused.
    pub max_stalled_renders: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "Certificate".to_string(),
            page_width: 1123.0,
            page_height: 794.0,
            pt_per_unit: 0.75,
            fallback_background: "#f8fafc".to_string(),
            asset_roots: vec![
                PathBuf::from("../frontend"),
                PathBuf::from("../frontend/assets"),
                PathBuf::from("public"),
            ],
            signature_candidates: vec!["signature.png".to_string(), "Signature.png".to_string()],
            timeout: Duration::from_secs(30),
            max_stalled_renders: 4,
        }
    }
}

impl RenderConfig {
    pub fn page_width_pt(&self) -> f32 {
        self.page_width * self.pt_per_unit
    }

    pub fn page_height_pt(&self) -> f32 {
        self.page_height * self.pt_per_unit
    }

    pub fn with_asset_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.asset_roots = roots;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_stalled_renders(mut self, max: usize) -> Self {
        self.max_stalled_renders = max;
        self
    }
}

/// Service-level settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Public base URL used for verification and download links.
    /// Env: `CLIENT_URL`
    pub client_url: String,

    /// Name signing the delivery email.
    /// Env: `FROM_NAME`
    pub from_name: String,

    /// Env: `ASSET_ROOTS` (colon-separated), `RENDER_TIMEOUT_SECS`
    pub render: RenderConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            client_url: "http://localhost:3000".to_string(),
            from_name: "CertiGen Team".to_string(),
            render: RenderConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("CLIENT_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                log::warn!("Empty CLIENT_URL, using default");
            } else {
                config.client_url = url.to_string();
            }
        }

        if let Some(name) = lookup("FROM_NAME") {
            if !name.trim().is_empty() {
                config.from_name = name.trim().to_string();
            }
        }

        if let Some(roots) = lookup("ASSET_ROOTS") {
            let parsed: Vec<PathBuf> = roots
                .split(':')
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .collect();
            if !parsed.is_empty() {
                config.render.asset_roots = parsed;
            }
        }

        if let Some(secs) = lookup("RENDER_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(n) if n > 0 => config.render.timeout = Duration::from_secs(n),
                _ => log::warn!("Invalid RENDER_TIMEOUT_SECS '{secs}', using default"),
            }
        }

        config
    }

    pub fn verification_url(&self, public_id: &str) -> String {
        format!("{}/verify/{}", self.client_url, public_id)
    }

    pub fn download_url(&self, public_id: &str) -> String {
        format!("{}/api/certificates/{}/download", self.client_url, public_id)
    }
}
