//! Pipeline – ties together composition, freezing and rasterization into a
//! single call.

use std::sync::Arc;

use crate::certificate::Certificate;
use crate::config::RenderConfig;
use crate::error::Result;
use crate::fonts::FontManager;
use crate::layout::{compose, ComposedPage};
use crate::layout_config::LayoutConfig;
use crate::render::{PrintPdfRasterizer, Rasterizer, Watchdog};
use crate::template::Template;

/// Renders certificates onto templates.
#[derive(Clone)]
pub struct Renderer {
    config: RenderConfig,
    fonts: Arc<FontManager>,
    backend: Arc<dyn Rasterizer>,
    watchdog: Watchdog,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        let watchdog = Watchdog::new(config.timeout, config.max_stalled_renders);
        Self {
            config,
            fonts: FontManager::builtin(),
            backend: Arc::new(PrintPdfRasterizer),
            watchdog,
        }
    }

    /// Swap the rasterization backend.
    pub fn with_backend(mut self, backend: Arc<dyn Rasterizer>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Style and place every element on the page.
    pub fn compose(
        &self,
        cert: &Certificate,
        template: &Template,
        qr: Option<&str>,
    ) -> Result<ComposedPage> {
        compose(cert, template, qr, &self.config, &self.fonts)
    }

    /// Composition frozen into the point-based IR the rasterizer consumes.
    pub fn layout(
        &self,
        cert: &Certificate,
        template: &Template,
        qr: Option<&str>,
    ) -> Result<LayoutConfig> {
        let page = self.compose(cert, template, qr)?;
        Ok(LayoutConfig::from_page(&page, &self.config))
    }

    /// Full pipeline: certificate + template + QR image → PDF bytes.
    pub fn render(&self, cert: &Certificate, template: &Template, qr: Option<&str>) -> Result<Vec<u8>> {
        log::debug!(
            "Rendering {} on template '{}'",
            cert.certificate_id,
            template.name
        );
        let layout = self.layout(cert, template, qr)?;
        let bytes = self.watchdog.run(self.backend.clone(), layout)?;
        log::info!(
            "Rendered {} ({} bytes)",
            cert.certificate_id,
            bytes.len()
        );
        Ok(bytes)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}
