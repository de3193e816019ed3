//! Sample templates and certificates for testing and demonstration.
//!
//! Each layout exercises a different part of the compositor.

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::certificate::{Certificate, CertificateStatus};
use crate::template::{Layout, Template};

/// 1×1 opaque PNG, usable anywhere an image data URI is expected.
pub const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

/// Every field, with a global colour and a mix of alignments.
pub fn classic_layout() -> &'static str {
    r##"{
    "global": { "textColor": "#1a365d", "textAlign": "center" },
    "recipientName": { "x": 500, "y": 300, "fontSize": 40, "fontFamily": "Times New Roman" },
    "courseTitle":   { "x": 500, "y": 400, "fontSize": 30 },
    "description":   { "x": 500, "y": 480, "fontSize": 18, "color": "#4a5568" },
    "date":          { "x": 200, "y": 600, "fontSize": 15, "align": "left" },
    "certificateId": { "x": 800, "y": 600, "fontSize": 12, "align": "left", "label": "Certificate No. " },
    "signature":     { "x": 200, "y": 520, "width": 150, "height": 50 },
    "qrCode":        { "x": 900, "y": 560, "size": 100 }
}"##
}

/// Only the name and the course title.
pub fn minimal_layout() -> &'static str {
    r#"{
    "recipientName": { "x": 500, "y": 300, "fontSize": 40 },
    "courseTitle":   { "x": 500, "y": 400, "fontSize": 30 }
}"#
}

/// Right-aligned text and a centred signature box.
pub fn right_aligned_layout() -> &'static str {
    r#"{
    "global": { "textAlign": "right" },
    "recipientName": { "x": 1000, "y": 250, "fontSize": 36 },
    "courseTitle":   { "x": 1000, "y": 330, "fontSize": 24 },
    "date":          { "x": 1000, "y": 700, "fontSize": 14, "label": "Issued " },
    "signature":     { "x": 0, "y": 600, "width": 200, "height": 60, "align": "center" }
}"#
}

pub fn parse_layout(json: &str) -> Layout {
    serde_json::from_str(json).unwrap_or_else(|_| Layout::default())
}

/// A stored template with `layout` and an inline background.
pub fn template(name: &str, layout: Layout) -> Template {
    Template {
        id: Uuid::new_v4(),
        name: name.to_string(),
        background_url: PIXEL_PNG.to_string(),
        layout,
        is_default: false,
        created_by: Uuid::nil(),
        created_at: Utc::now(),
    }
}

/// The Jane Doe certificate with a fixed issue date.
pub fn certificate() -> Certificate {
    let issued = Utc
        .with_ymd_and_hms(2024, 3, 9, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Certificate {
        id: Uuid::nil(),
        certificate_id: "CERT-1A2B-3C4D-5E6F".to_string(),
        recipient_name: "Jane Doe".to_string(),
        recipient_email: "jane@example.com".to_string(),
        course_title: "Data Structures".to_string(),
        description: "For successfully completing the requirements.".to_string(),
        issue_date: issued,
        issuer: Uuid::nil(),
        template_id: None,
        pdf_url: None,
        status: CertificateStatus::Issued,
        created_at: issued,
    }
}
