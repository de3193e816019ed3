//! Certificate delivery by email.
//!
//! Delivery is best-effort: [`spawn_delivery`] runs the job on a background
//! thread and only logs its outcome. The certificate already exists by the
//! time a job starts, and nothing here can undo that.

use std::thread::{self, JoinHandle};

use crate::certificate::Certificate;
use crate::error::{CertError, Result};
use crate::html::escape;

/// A file attached to an outbound email.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// HTML rendition of `text`.
    pub html: String,
    pub attachment: Option<Attachment>,
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<()>;
}

/// Logs messages instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<()> {
        log::info!(
            "Email to {} – {:?} ({} attachment bytes)",
            email.to,
            email.subject,
            email.attachment.as_ref().map_or(0, |a| a.bytes.len())
        );
        Ok(())
    }
}

/// Download filename of a certificate PDF.
pub fn pdf_filename(cert: &Certificate) -> String {
    format!("Certificate-{}.pdf", cert.certificate_id)
}

/// The notification sent to a certificate's recipient, with its PDF attached.
pub fn build_certificate_email(
    cert: &Certificate,
    verification_url: &str,
    from_name: &str,
    pdf: Vec<u8>,
) -> Email {
    let text = format!(
        "Dear {},\n\nCongratulations! Please find attached your official certificate for \"{}\".\n\nYou can also verify it online here: {}\n\nBest Regards,\n{}",
        cert.recipient_name, cert.course_title, verification_url, from_name
    );
    let html = format!("<p>{}</p>", escape(&text).replace('\n', "<br>"));
    Email {
        to: cert.recipient_email.clone(),
        subject: format!("Your Certificate: {}", cert.course_title),
        text,
        html,
        attachment: Some(Attachment {
            filename: pdf_filename(cert),
            content_type: "application/pdf".to_string(),
            bytes: pdf,
        }),
    }
}

/// Handle on a background delivery.
#[derive(Debug)]
pub struct DeliveryTicket {
    handle: Option<JoinHandle<bool>>,
}

impl DeliveryTicket {
    /// A ticket for a delivery that was never started.
    pub fn skipped() -> Self {
        Self { handle: None }
    }

    /// Wait for the delivery to finish. `true` if the email was handed to the
    /// mailer.
    pub fn join(self) -> bool {
        match self.handle {
            Some(handle) => handle.join().unwrap_or(false),
            None => false,
        }
    }
}

/// Run `job` on a background thread, logging and dropping any error.
pub fn spawn_delivery<F>(certificate_id: &str, job: F) -> DeliveryTicket
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let id = certificate_id.to_string();
    let spawned = thread::Builder::new()
        .name("certforge-delivery".to_string())
        .spawn(move || match job() {
            Ok(()) => {
                log::info!("Delivered certificate {id}");
                true
            }
            Err(e) => {
                log::warn!("Delivery of certificate {id} failed: {e}");
                false
            }
        });
    match spawned {
        Ok(handle) => DeliveryTicket {
            handle: Some(handle),
        },
        Err(e) => {
            log::warn!(
                "{}",
                CertError::Delivery(format!("could not start delivery for {certificate_id}: {e}"))
            );
            DeliveryTicket::skipped()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples;

    #[test]
    fn email_contents() {
        let mut cert = samples::certificate();
        cert.course_title = "Rust & Systems".to_string();
        let email = build_certificate_email(
            &cert,
            "http://localhost:3000/verify/CERT-1A2B-3C4D-5E6F",
            "CertiGen Team",
            b"%PDF-".to_vec(),
        );
        assert_eq!(email.to, "jane@example.com");
        assert_eq!(email.subject, "Your Certificate: Rust & Systems");
        assert!(email.text.starts_with("Dear Jane Doe,\n\n"));
        assert!(email.text.contains("for \"Rust & Systems\""));
        assert!(email.text.contains("verify it online here: http://localhost:3000/verify/CERT-1A2B-3C4D-5E6F"));
        assert!(email.text.ends_with("Best Regards,\nCertiGen Team"));
        assert!(email.html.contains("Rust &amp; Systems"));
        assert!(email.html.contains("<br><br>"));

        let attachment = email.attachment.unwrap();
        assert_eq!(attachment.filename, "Certificate-CERT-1A2B-3C4D-5E6F.pdf");
        assert_eq!(attachment.content_type, "application/pdf");
    }

    #[test]
    fn failed_job_is_swallowed() {
        let ticket = spawn_delivery("CERT-0000-0000-0000", || {
            Err(CertError::Delivery("smtp down".into()))
        });
        assert!(!ticket.join());
    }

    #[test]
    fn successful_job_reports_true() {
        assert!(spawn_delivery("CERT-0000-0000-0000", || Ok(())).join());
        assert!(!DeliveryTicket::skipped().join());
    }
}
