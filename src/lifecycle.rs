//! Certificate lifecycle – creation, access control, verification and
//! download.
//!
//! State machine: `Issued → Revoked`, with `Revoked` terminal. Creation
//! assigns the public id before the record reaches the store and hands
//! email delivery to a background job whose failure never rolls anything
//! back.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::certificate::{
    generate_public_id, is_public_id, Certificate, CertificatePatch, CertificateStatus,
    NewCertificate, PublicView,
};
use crate::config::ServiceConfig;
use crate::delivery::{
    build_certificate_email, pdf_filename, spawn_delivery, DeliveryTicket, LogMailer, Mailer,
};
use crate::error::{CertError, Result};
use crate::filter::{CertificateFilter, Page, PageRequest};
use crate::identity::{Identity, Role};
use crate::pipeline::Renderer;
use crate::qr::QrEncoder;
use crate::resolver::TemplateResolver;
use crate::store::{CertificateStore, IdentityStore, TemplateStore};
use crate::template::Template;

/// Attempts at drawing a fresh public id when the store reports a clash.
const PUBLIC_ID_ATTEMPTS: usize = 3;

/// Issuer label used when the issuing identity is no longer known.
const UNKNOWN_ISSUER: &str = "Unknown issuer";

/// Result of a successful creation.
#[derive(Debug)]
pub struct Created {
    pub certificate: Certificate,
    pub verification_url: String,
    /// Background email delivery; joining it is optional.
    pub delivery: DeliveryTicket,
}

/// A rendered certificate ready to stream as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub content_disposition: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_issued: usize,
    pub total_revoked: usize,
    pub total_templates: usize,
}

pub struct CertificateService {
    certificates: Arc<dyn CertificateStore>,
    identities: Arc<dyn IdentityStore>,
    templates: TemplateResolver,
    renderer: Renderer,
    qr: Option<Arc<dyn QrEncoder>>,
    mailer: Arc<dyn Mailer>,
    config: ServiceConfig,
}

impl CertificateService {
    pub fn new(
        config: ServiceConfig,
        certificates: Arc<dyn CertificateStore>,
        templates: Arc<dyn TemplateStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            templates: TemplateResolver::new(templates),
            renderer: Renderer::new(config.render.clone()),
            certificates,
            identities,
            qr: None,
            mailer: Arc::new(LogMailer),
            config,
        }
    }

    /// Service over a single store implementing every persistence trait.
    pub fn with_store<S>(config: ServiceConfig, store: Arc<S>) -> Self
    where
        S: CertificateStore + TemplateStore + IdentityStore + 'static,
    {
        Self::new(config, store.clone(), store.clone(), store)
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_qr(mut self, qr: Arc<dyn QrEncoder>) -> Self {
        self.qr = Some(qr);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Template administration.
    pub fn templates(&self) -> &TemplateResolver {
        &self.templates
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Issue a certificate and start delivering it to the recipient.
    pub fn create(&self, new: NewCertificate, actor: &Identity) -> Result<Created> {
        actor.require_role(&[Role::Issuer, Role::Admin])?;
        let template = self.templates.resolve(new.template_id)?;
        let mut candidate = new.into_certificate(actor, Some(template.id))?;

        let mut attempt = 1;
        let certificate = loop {
            match self.certificates.insert_certificate(candidate.clone()) {
                Ok(saved) => break saved,
                Err(CertError::Conflict(msg)) if attempt < PUBLIC_ID_ATTEMPTS => {
                    log::warn!("{msg}, drawing a new public id");
                    candidate.certificate_id = generate_public_id();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        log::info!(
            "Certificate {} issued to {} by {}",
            certificate.certificate_id,
            certificate.recipient_email,
            actor.id
        );

        let verification_url = self.config.verification_url(&certificate.certificate_id);
        let delivery = self.dispatch(&certificate, template, &verification_url);
        Ok(Created {
            certificate,
            verification_url,
            delivery,
        })
    }

    fn dispatch(&self, cert: &Certificate, template: Template, url: &str) -> DeliveryTicket {
        let cert = cert.clone();
        let url = url.to_string();
        let renderer = self.renderer.clone();
        let qr = self.qr.clone();
        let mailer = self.mailer.clone();
        let from_name = self.config.from_name.clone();
        let id = cert.certificate_id.clone();
        spawn_delivery(&id, move || {
            let qr_uri = qr.map(|q| q.encode(&url)).transpose()?;
            let pdf = renderer.render(&cert, &template, qr_uri.as_deref())?;
            log::info!("Sending certificate {} to {}", cert.certificate_id, cert.recipient_email);
            mailer.send(&build_certificate_email(&cert, &url, &from_name, pdf))
        })
    }

    fn load(&self, id: Uuid) -> Result<Certificate> {
        self.certificates
            .get_certificate(id)?
            .ok_or_else(|| CertError::NotFound("Certificate".to_string()))
    }

    /// Internal id or public id.
    fn load_any(&self, id_or_public: &str) -> Result<Certificate> {
        let key = id_or_public.trim();
        let found = if is_public_id(key) {
            self.certificates.find_by_public_id(key)?
        } else {
            match Uuid::parse_str(key) {
                Ok(id) => self.certificates.get_certificate(id)?,
                Err(_) => None,
            }
        };
        found.ok_or_else(|| CertError::NotFound("Certificate".to_string()))
    }

    pub fn get(&self, id: Uuid, actor: &Identity) -> Result<Certificate> {
        let cert = self.load(id)?;
        actor.require_owner_or_admin(cert.issuer)?;
        Ok(cert)
    }

    /// Filtered, paginated listing, newest first. Non-privileged callers only
    /// ever see their own certificates.
    pub fn list(
        &self,
        filter: CertificateFilter,
        page: PageRequest,
        actor: &Identity,
    ) -> Result<Page<Certificate>> {
        let filter = if actor.is_privileged() {
            filter
        } else {
            filter.scoped_to_issuer(actor.id)
        };
        let (data, total) = self.certificates.query_certificates(&filter, page)?;
        log::debug!("Listed {} of {total} certificates for {}", data.len(), actor.id);
        Ok(Page {
            count: data.len(),
            total,
            pagination: page.pagination(total),
            data,
        })
    }

    /// [`list`](Self::list) from decoded query-string pairs.
    pub fn list_query<K, V>(&self, query: &[(K, V)], actor: &Identity) -> Result<Page<Certificate>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (filter, page) = CertificateFilter::from_query(query)?;
        self.list(filter, page, actor)
    }

    pub fn update(&self, id: Uuid, patch: CertificatePatch, actor: &Identity) -> Result<Certificate> {
        let cert = self.load(id)?;
        actor.require_owner_or_admin(cert.issuer)?;
        if let Some(template_id) = patch.template_id {
            self.templates.get(template_id)?;
        }
        let updated = self
            .certificates
            .update_certificate(id, &mut |c| patch.apply(c))?;
        log::info!("Certificate {} updated by {}", updated.certificate_id, actor.id);
        Ok(updated)
    }

    /// Mark a certificate `Revoked`. Revoking twice is a no-op.
    pub fn revoke(&self, id: Uuid, actor: &Identity) -> Result<Certificate> {
        let updated = self.update(id, CertificatePatch::revoke(), actor)?;
        log::info!("Certificate {} revoked by {}", updated.certificate_id, actor.id);
        Ok(updated)
    }

    pub fn delete(&self, id: Uuid, actor: &Identity) -> Result<()> {
        let cert = self.load(id)?;
        actor.require_owner_or_admin(cert.issuer)?;
        if !self.certificates.remove_certificate(id)? {
            return Err(CertError::NotFound("Certificate".to_string()));
        }
        log::info!("Certificate {} deleted by {}", cert.certificate_id, actor.id);
        Ok(())
    }

    /// Public verification by public id.
    pub fn verify(&self, public_id: &str) -> Result<PublicView> {
        let public_id = public_id.trim();
        let cert = self
            .certificates
            .find_by_public_id(public_id)?
            .ok_or_else(|| CertError::NotFound("Certificate".to_string()))?;
        if cert.is_revoked() {
            log::info!("Verification of revoked certificate {public_id}");
            return Err(CertError::Revoked(cert.certificate_id));
        }
        let issued_by = self
            .identities
            .get_identity(cert.issuer)?
            .map(|i| i.issued_by_label().to_string())
            .unwrap_or_else(|| UNKNOWN_ISSUER.to_string());

        Ok(PublicView {
            valid: true,
            download_url: self.config.download_url(&cert.certificate_id),
            certificate_id: cert.certificate_id,
            recipient_name: cert.recipient_name,
            course_title: cert.course_title,
            issue_date: cert.issue_date,
            issued_by,
        })
    }

    /// Render a certificate to PDF. Public.
    ///
    /// A certificate stored without a template is rendered with the current
    /// default, which is then recorded on it.
    pub fn download(&self, id_or_public: &str) -> Result<Download> {
        let mut cert = self.load_any(id_or_public)?;
        let template = self.templates.resolve(cert.template_id)?;
        if cert.template_id.is_none() {
            cert = self.certificates.update_certificate(cert.id, &mut |c| {
                c.template_id.get_or_insert(template.id);
                Ok(())
            })?;
            log::debug!(
                "Recorded template {} on certificate {}",
                template.id,
                cert.certificate_id
            );
        }

        let url = self.config.verification_url(&cert.certificate_id);
        let qr_uri = match &self.qr {
            Some(q) => Some(q.encode(&url)?),
            None => None,
        };
        let bytes = self.renderer.render(&cert, &template, qr_uri.as_deref())?;
        let filename = pdf_filename(&cert);
        Ok(Download {
            content_disposition: format!("attachment; filename=\"{filename}\""),
            filename,
            content_type: "application/pdf",
            bytes,
        })
    }

    pub fn stats(&self, _actor: &Identity) -> Result<Stats> {
        Ok(Stats {
            total_issued: self.certificates.count_by_status(CertificateStatus::Issued)?,
            total_revoked: self.certificates.count_by_status(CertificateStatus::Revoked)?,
            total_templates: self.templates.list()?.len(),
        })
    }
}
