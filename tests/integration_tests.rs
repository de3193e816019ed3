//! Integration tests for certforge.
//!
//! These tests validate:
//! - The issue → verify → download flow end to end
//! - Single-default template invariant under concurrent writers
//! - Composition output is stable for identical inputs
//! - Delivery and rendering failures surface (or not) where they should

use std::fs;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};

use certforge::assets::parse_data_uri;
use certforge::delivery::{Email, Mailer};
use certforge::filter::{CertificateFilter, FilterField, FilterOp, FilterValue, PageRequest};
use certforge::layout::ImageKind;
use certforge::layout_config::LayoutConfig;
use certforge::qr::StaticQr;
use certforge::render::{render_pdf, Rasterizer};
use certforge::samples::{self, PIXEL_PNG};
use certforge::store::TemplateStore;
use certforge::template::TextField;
use certforge::{
    CertError, CertificatePatch, CertificateService, Identity, Layout, MemoryStore,
    NewCertificate, NewTemplate, RenderConfig, Renderer, Result, Role, ServiceConfig,
    TemplatePatch,
};

// =====================================================================
// Helpers
// =====================================================================

#[derive(Default)]
struct Outbox(Mutex<Vec<Email>>);

impl Mailer for Outbox {
    fn send(&self, email: &Email) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| CertError::Delivery("outbox poisoned".into()))?
            .push(email.clone());
        Ok(())
    }
}

struct Unreachable;

impl Mailer for Unreachable {
    fn send(&self, _: &Email) -> Result<()> {
        Err(CertError::Delivery("connection refused".into()))
    }
}

struct Stalls;

impl Rasterizer for Stalls {
    fn rasterize(&self, layout: &LayoutConfig) -> Result<Vec<u8>> {
        thread::sleep(Duration::from_millis(400));
        render_pdf(layout)
    }
}

struct World {
    service: CertificateService,
    store: Arc<MemoryStore>,
    admin: Identity,
    issuer: Identity,
}

fn render_config() -> RenderConfig {
    RenderConfig::default().with_asset_roots(Vec::new())
}

fn world_with(service: impl FnOnce(CertificateService) -> CertificateService) -> World {
    let store = Arc::new(MemoryStore::new());
    let admin = Identity::new("Root", Role::Admin);
    let issuer = Identity::new("Grace", Role::Issuer).with_organization("State University");
    store.put_identity(admin.clone()).unwrap();
    store.put_identity(issuer.clone()).unwrap();

    let mut config = ServiceConfig::default();
    config.render = render_config();
    let base = CertificateService::with_store(config, store.clone())
        .with_qr(Arc::new(StaticQr::from_data_uri(PIXEL_PNG).unwrap()));
    World {
        service: service(base),
        store,
        admin,
        issuer,
    }
}

fn world() -> World {
    world_with(|s| s.with_mailer(Arc::new(Outbox::default())))
}

fn minimal_default(w: &World) {
    let layout = samples::parse_layout(samples::minimal_layout());
    w.service
        .templates()
        .create(
            NewTemplate::new("Minimal", "/bg.png")
                .with_layout(layout)
                .as_default(),
            &w.admin,
        )
        .unwrap();
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn digest(s: &str) -> Vec<u8> {
    Sha256::digest(s.as_bytes()).to_vec()
}

// =====================================================================
// Issue → verify → download
// =====================================================================

#[test]
fn jane_doe_scenario() {
    let w = world();
    minimal_default(&w);

    let created = w
        .service
        .create(
            NewCertificate::new("Jane Doe", "jane@example.com", "Data Structures"),
            &w.issuer,
        )
        .unwrap();
    let cert = &created.certificate;
    assert_eq!(
        created.verification_url,
        format!("http://localhost:3000/verify/{}", cert.certificate_id)
    );
    assert!(created.delivery.join());

    let view = w.service.verify(&cert.certificate_id).unwrap();
    assert!(view.valid);
    assert_eq!(view.recipient_name, "Jane Doe");
    assert_eq!(view.course_title, "Data Structures");
    assert_eq!(view.issued_by, "State University");

    let download = w.service.download(&cert.certificate_id).unwrap();
    assert_valid_pdf(&download.bytes);
}

#[test]
fn create_without_any_default_fails() {
    let w = world();
    let err = w
        .service
        .create(NewCertificate::new("A", "a@example.com", "C"), &w.issuer)
        .unwrap_err();
    assert!(matches!(err, CertError::NoDefaultTemplate));
    assert_eq!(w.store.count_templates().unwrap(), 0);
}

#[test]
fn verification_payload_is_stable() {
    let w = world();
    minimal_default(&w);
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();
    let id = &created.certificate.certificate_id;
    let first = w.service.verify(id).unwrap();
    let second = w.service.verify(id).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn revoked_is_distinct_from_missing() {
    let w = world();
    minimal_default(&w);
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();
    w.service.revoke(created.certificate.id, &w.issuer).unwrap();

    let revoked = w.service.verify(&created.certificate.certificate_id).unwrap_err();
    assert_eq!(revoked.status_code(), 410);
    assert_eq!(revoked.code(), "certificate_revoked");

    let missing = w.service.verify("CERT-0000-0000-0000").unwrap_err();
    assert_eq!(missing.status_code(), 404);

    let back = CertificatePatch::from_json(serde_json::json!({"status": "Issued"})).unwrap();
    assert_eq!(
        w.service
            .update(created.certificate.id, back, &w.issuer)
            .unwrap_err()
            .status_code(),
        400
    );
}

#[test]
fn download_headers() {
    let w = world();
    minimal_default(&w);
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();
    let id = &created.certificate.certificate_id;
    let download = w.service.download(id).unwrap();
    assert_eq!(download.content_type, "application/pdf");
    assert_eq!(download.filename, format!("Certificate-{id}.pdf"));
    assert_eq!(
        download.content_disposition,
        format!("attachment; filename=\"Certificate-{id}.pdf\"")
    );
}

#[test]
fn patch_cannot_rewrite_identity_fields() {
    let w = world();
    minimal_default(&w);
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();
    let attempt = CertificatePatch::from_json(serde_json::json!({
        "certificateId": "CERT-AAAA-BBBB-CCCC",
        "recipientName": "Mallory"
    }));
    assert_eq!(attempt.unwrap_err().status_code(), 400);

    let rename = CertificatePatch::from_json(serde_json::json!({"recipientName": "Jane Q. Doe"})).unwrap();
    let updated = w
        .service
        .update(created.certificate.id, rename, &w.issuer)
        .unwrap();
    assert_eq!(updated.recipient_name, "Jane Q. Doe");
    assert_eq!(updated.certificate_id, created.certificate.certificate_id);
    assert_eq!(updated.issuer, created.certificate.issuer);
}

// =====================================================================
// Default template invariant
// =====================================================================

#[test]
fn at_most_one_default_after_any_sequence() {
    let w = world();
    let templates = w.service.templates();
    let defaults = || templates.list().unwrap().iter().filter(|t| t.is_default).count();

    let a = templates.create(NewTemplate::new("A", "/a.png"), &w.admin).unwrap();
    assert_eq!(defaults(), 0);
    templates
        .create(NewTemplate::new("B", "/b.png").as_default(), &w.admin)
        .unwrap();
    assert_eq!(defaults(), 1);
    templates
        .create(NewTemplate::new("C", "/c.png").as_default(), &w.admin)
        .unwrap();
    assert_eq!(defaults(), 1);
    templates.set_default(a.id, &w.admin).unwrap();
    assert_eq!(defaults(), 1);
    assert_eq!(templates.resolve(None).unwrap().id, a.id);

    let patch: TemplatePatch = serde_json::from_str(r#"{"isDefault": false}"#).unwrap();
    templates.update(a.id, patch, &w.admin).unwrap();
    assert_eq!(defaults(), 0);
}

#[test]
fn concurrent_set_default_leaves_exactly_one() {
    let w = world();
    let templates = w.service.templates();
    let ids: Vec<_> = (0..8)
        .map(|i| {
            templates
                .create(NewTemplate::new(format!("T{i}"), "/bg.png"), &w.admin)
                .unwrap()
                .id
        })
        .collect();

    for _ in 0..20 {
        thread::scope(|s| {
            for id in &ids {
                let admin = &w.admin;
                s.spawn(move || templates.set_default(*id, admin).unwrap());
            }
        });
        let defaults = templates
            .list()
            .unwrap()
            .into_iter()
            .filter(|t| t.is_default)
            .count();
        assert_eq!(defaults, 1);
    }
}

#[test]
fn referenced_template_cannot_be_deleted() {
    let w = world();
    minimal_default(&w);
    let template = w.service.templates().resolve(None).unwrap();
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();

    let err = w.service.templates().delete(template.id, &w.admin).unwrap_err();
    assert_eq!(err.status_code(), 409);

    w.service.delete(created.certificate.id, &w.admin).unwrap();
    w.service.templates().delete(template.id, &w.admin).unwrap();
}

#[test]
fn template_deletion_racing_issuance_leaves_no_orphans() {
    for _ in 0..10 {
        let w = world();
        minimal_default(&w);
        let template = w.service.templates().resolve(None).unwrap();
        let (deleted, created) = thread::scope(|s| {
            let deleter = s.spawn(|| w.service.templates().delete(template.id, &w.admin));
            let issuer = s.spawn(|| {
                w.service
                    .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
            });
            (deleter.join().unwrap(), issuer.join().unwrap())
        });
        match (deleted, created) {
            (Ok(()), Err(e)) => assert!(matches!(e.status_code(), 400 | 404), "{e}"),
            (Err(e), Ok(created)) => {
                assert_eq!(e.status_code(), 409);
                assert_eq!(created.certificate.template_id, Some(template.id));
                assert!(w.service.templates().get(template.id).is_ok());
            }
            (Ok(()), Ok(_)) => panic!("certificate issued on a deleted template"),
            (Err(a), Err(b)) => panic!("both operations failed: {a} / {b}"),
        }
    }
}

// =====================================================================
// Rendering
// =====================================================================

#[test]
fn omitted_description_renders_without_it() {
    let renderer = Renderer::new(render_config());
    let cert = samples::certificate();
    let template = samples::template("Minimal", samples::parse_layout(samples::minimal_layout()));

    let page = renderer.compose(&cert, &template, Some(PIXEL_PNG)).unwrap();
    assert!(page.text(TextField::Description).is_none());
    assert!(page.text(TextField::RecipientName).is_some());
    assert!(!page.to_html().contains(&cert.description));

    let bytes = renderer.render(&cert, &template, Some(PIXEL_PNG)).unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn rendering_is_deterministic() {
    let renderer = Renderer::new(render_config());
    let cert = samples::certificate();
    let template = samples::template("Classic", samples::parse_layout(samples::classic_layout()));

    let a = renderer.layout(&cert, &template, Some(PIXEL_PNG)).unwrap();
    let b = renderer.layout(&cert, &template, Some(PIXEL_PNG)).unwrap();
    assert_eq!(digest(&a.to_json()), digest(&b.to_json()));

    let html_a = renderer.compose(&cert, &template, Some(PIXEL_PNG)).unwrap().to_html();
    let html_b = renderer.compose(&cert, &template, Some(PIXEL_PNG)).unwrap().to_html();
    assert_eq!(digest(&html_a), digest(&html_b));

    let bytes1 = renderer.render(&cert, &template, Some(PIXEL_PNG)).unwrap();
    let bytes2 = renderer.render(&cert, &template, Some(PIXEL_PNG)).unwrap();
    assert_valid_pdf(&bytes1);
    assert_eq!(Sha256::digest(&bytes1), Sha256::digest(&bytes2));

    // A fresh renderer produces the same bytes too.
    let bytes3 = Renderer::new(render_config())
        .render(&cert, &template, Some(PIXEL_PNG))
        .unwrap();
    assert_eq!(bytes1, bytes3);

    let mut other = cert.clone();
    other.recipient_name = "John Roe".to_string();
    let bytes4 = renderer.render(&other, &template, Some(PIXEL_PNG)).unwrap();
    assert_ne!(bytes1, bytes4);
}

#[test]
fn assets_resolve_from_configured_roots() {
    let root = tempfile::tempdir().unwrap();
    let png = parse_data_uri(PIXEL_PNG).unwrap();
    fs::write(root.path().join("bg.png"), &png).unwrap();
    fs::write(root.path().join("Signature.png"), &png).unwrap();

    let renderer =
        Renderer::new(RenderConfig::default().with_asset_roots(vec![root.path().to_path_buf()]));
    let mut template = samples::template("Classic", Layout::default());
    template.background_url = "/bg.png".to_string();

    let page = renderer
        .compose(&samples::certificate(), &template, None)
        .unwrap();
    let html = page.to_html();
    assert!(html.contains("<img class=\"background\" src=\"data:image/png;base64,"));
    assert!(page.image(ImageKind::Signature).is_some());
    assert!(page.image(ImageKind::QrCode).is_none());
}

#[test]
fn slow_backend_times_out_on_download() {
    let w = world_with(|s| {
        let renderer = Renderer::new(render_config().with_timeout(Duration::from_millis(50)))
            .with_backend(Arc::new(Stalls));
        s.with_renderer(renderer).with_mailer(Arc::new(Outbox::default()))
    });
    minimal_default(&w);
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();
    // The emailed copy times out too; creation is unaffected.
    assert!(!created.delivery.join());

    let err = w.service.download(&created.certificate.certificate_id).unwrap_err();
    assert!(matches!(err, CertError::RenderFailure(_)));
    assert_eq!(err.status_code(), 500);
}

// =====================================================================
// Delivery
// =====================================================================

#[test]
fn email_failure_does_not_block_creation() {
    let w = world_with(|s| s.with_mailer(Arc::new(Unreachable)));
    minimal_default(&w);
    let created = w
        .service
        .create(NewCertificate::new("Jane Doe", "jane@example.com", "DS"), &w.issuer)
        .unwrap();
    assert!(!created.delivery.join());
    assert!(w.service.verify(&created.certificate.certificate_id).is_ok());
}

#[test]
fn recipient_receives_pdf() {
    let outbox = Arc::new(Outbox::default());
    let shared = outbox.clone();
    let w = world_with(move |s| s.with_mailer(shared));
    minimal_default(&w);
    let created = w
        .service
        .create(
            NewCertificate::new("Jane Doe", "jane@example.com", "Data Structures"),
            &w.issuer,
        )
        .unwrap();
    assert!(created.delivery.join());

    let sent = outbox.0.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "jane@example.com");
    assert_eq!(sent[0].subject, "Your Certificate: Data Structures");
    assert!(sent[0].text.contains(&created.verification_url));
    assert_valid_pdf(&sent[0].attachment.as_ref().unwrap().bytes);
}

// =====================================================================
// Listing
// =====================================================================

#[test]
fn filters_and_scoping() {
    let w = world();
    minimal_default(&w);
    let other = Identity::new("Other", Role::Issuer);

    for (name, by, year) in [
        ("Old", &w.issuer, 2020),
        ("New", &w.issuer, 2024),
        ("Foreign", &other, 2024),
    ] {
        let mut new = NewCertificate::new(name, "x@example.com", "Course");
        new.issue_date = Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).single();
        w.service.create(new, by).unwrap().delivery.join();
    }

    let recent = w
        .service
        .list_query(&[("issueDate[gte]", "2024-01-01"), ("sort", "-createdAt")], &w.issuer)
        .unwrap();
    assert_eq!(recent.total, 1);
    assert_eq!(recent.data[0].recipient_name, "New");

    // A non-admin cannot widen their scope by naming another issuer.
    let spoofed = w
        .service
        .list_query(&[("issuer", other.id.to_string())], &w.issuer)
        .unwrap();
    assert!(spoofed.data.iter().all(|c| c.issuer == w.issuer.id));

    let named = CertificateFilter::new()
        .with(
            FilterField::RecipientName,
            FilterOp::In,
            FilterValue::List(vec![
                FilterValue::Text("Old".into()),
                FilterValue::Text("Foreign".into()),
            ]),
        )
        .unwrap();
    let all = w.service.list(named, PageRequest::default(), &w.admin).unwrap();
    assert_eq!(all.total, 2);

    assert!(w
        .service
        .list_query(&[("status[gt]", "Issued")], &w.admin)
        .is_err());
}
