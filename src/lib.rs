//! # certforge – certificate issuance, rendering and verification
//!
//! Certificates are issued against reusable templates (a background image
//! plus a field coordinate map) and rendered on demand to a single-page
//! landscape PDF. The rendering pipeline stages are:
//!
//! 1. **Resolve** – pick the requested or default template ([`resolver`])
//! 2. **Style** – field > template `global` > engine default ([`style`])
//! 3. **Compose** – place fields absolutely with Taffy ([`layout`]),
//!    resolving background and signature assets ([`assets`])
//! 4. **Freeze** – scale the composed page into the point-based IR
//!    ([`layout_config`]); [`html`] exports the same page as HTML
//! 5. **Render** – emit PDF bytes via printpdf under a timeout ([`render`])
//!
//! [`pipeline::Renderer`] runs stages 2–5; [`lifecycle::CertificateService`]
//! wraps it with issuance, access control, verification and delivery.

pub mod assets;
pub mod certificate;
pub mod config;
pub mod delivery;
pub mod error;
pub mod filter;
pub mod fonts;
pub mod html;
pub mod identity;
pub mod layout;
pub mod layout_config;
pub mod lifecycle;
pub mod pipeline;
pub mod qr;
pub mod render;
pub mod resolver;
pub mod samples;
pub mod store;
pub mod style;
pub mod template;

// Re-exports for convenience
pub use certificate::{Certificate, CertificatePatch, NewCertificate, PublicView};
pub use config::{RenderConfig, ServiceConfig};
pub use error::{CertError, Result};
pub use identity::{Identity, Role};
pub use lifecycle::{CertificateService, Created, Download, Stats};
pub use pipeline::Renderer;
pub use store::MemoryStore;
pub use template::{Layout, NewTemplate, Template, TemplatePatch};
