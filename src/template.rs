//! Layout model – where each certificate field is drawn on the page.
//!
//! A [`Layout`] maps field keys to [`TextConfig`] (text fields) or to box
//! configs (signature, QR code). An absent entry suppresses that element; it
//! is never an error. All coordinates are layout units on the fixed
//! 1123×794 landscape page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CertError, Result};
use crate::style::TextAlign;

/// The five text fields a certificate can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    RecipientName,
    CourseTitle,
    Description,
    Date,
    CertificateId,
}

impl TextField {
    pub const ALL: [TextField; 5] = [
        TextField::RecipientName,
        TextField::CourseTitle,
        TextField::Description,
        TextField::Date,
        TextField::CertificateId,
    ];

    /// Field key as it appears in a serialised layout.
    pub fn key(&self) -> &'static str {
        match self {
            TextField::RecipientName => "recipientName",
            TextField::CourseTitle => "courseTitle",
            TextField::Description => "description",
            TextField::Date => "date",
            TextField::CertificateId => "certificateId",
        }
    }

    /// Prefix drawn before the value when the layout gives no `label`.
    pub fn default_label(&self) -> Option<&'static str> {
        match self {
            TextField::Date => Some("Date: "),
            TextField::CertificateId => Some("ID: "),
            _ => None,
        }
    }
}

fn default_font_size() -> f32 {
    20.0
}

fn default_font_family() -> String {
    "Helvetica".to_string()
}

/// Position and styling of one text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<TextAlign>,
    /// Prefix for `date` and `certificateId`; ignored on other fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TextConfig {
    pub fn at(x: f32, y: f32, font_size: f32) -> Self {
        Self {
            x,
            y,
            font_size,
            font_family: default_font_family(),
            color: None,
            align: None,
            label: None,
        }
    }
}

/// Signature box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxConfig {
    #[serde(default = "BoxConfig::default_x")]
    pub x: f32,
    #[serde(default = "BoxConfig::default_y")]
    pub y: f32,
    #[serde(default = "BoxConfig::default_width")]
    pub width: f32,
    #[serde(default = "BoxConfig::default_height")]
    pub height: f32,
    /// `center` centres the box on the page; otherwise `x` anchors its left
    /// (or, for `right`, its right) edge. Defaults to left.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<TextAlign>,
}

impl BoxConfig {
    fn default_x() -> f32 {
        200.0
    }
    fn default_y() -> f32 {
        550.0
    }
    fn default_width() -> f32 {
        150.0
    }
    fn default_height() -> f32 {
        50.0
    }
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            x: Self::default_x(),
            y: Self::default_y(),
            width: Self::default_width(),
            height: Self::default_height(),
            align: None,
        }
    }
}

/// Square QR code box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrConfig {
    #[serde(default = "QrConfig::default_x")]
    pub x: f32,
    #[serde(default = "QrConfig::default_y")]
    pub y: f32,
    #[serde(default = "QrConfig::default_size")]
    pub size: f32,
}

impl QrConfig {
    fn default_x() -> f32 {
        800.0
    }
    fn default_y() -> f32 {
        500.0
    }
    fn default_size() -> f32 {
        100.0
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            x: Self::default_x(),
            y: Self::default_y(),
            size: Self::default_size(),
        }
    }
}

/// Template-wide text defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
}

/// Field coordinate map of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_title: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<BoxConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<QrConfig>,
}

impl Default for Layout {
    /// The layout a template gets when its creator supplies none.
    fn default() -> Self {
        Self {
            global: None,
            recipient_name: Some(TextConfig::at(500.0, 300.0, 40.0)),
            course_title: Some(TextConfig::at(500.0, 400.0, 30.0)),
            description: Some(TextConfig::at(500.0, 480.0, 18.0)),
            date: Some(TextConfig::at(200.0, 600.0, 15.0)),
            certificate_id: Some(TextConfig::at(800.0, 600.0, 12.0)),
            signature: Some(BoxConfig::default()),
            qr_code: Some(QrConfig::default()),
        }
    }
}

impl Layout {
    /// A layout that draws nothing but the background.
    pub fn empty() -> Self {
        Self {
            global: None,
            recipient_name: None,
            course_title: None,
            description: None,
            date: None,
            certificate_id: None,
            signature: None,
            qr_code: None,
        }
    }

    pub fn text(&self, field: TextField) -> Option<&TextConfig> {
        match field {
            TextField::RecipientName => self.recipient_name.as_ref(),
            TextField::CourseTitle => self.course_title.as_ref(),
            TextField::Description => self.description.as_ref(),
            TextField::Date => self.date.as_ref(),
            TextField::CertificateId => self.certificate_id.as_ref(),
        }
    }

    /// Check every coordinate and size is a finite, non-negative number.
    pub fn validate(&self) -> Result<()> {
        for field in TextField::ALL {
            if let Some(cfg) = self.text(field) {
                let key = field.key();
                non_negative(key, "x", cfg.x)?;
                non_negative(key, "y", cfg.y)?;
                non_negative(key, "fontSize", cfg.font_size)?;
            }
        }
        if let Some(sig) = &self.signature {
            non_negative("signature", "x", sig.x)?;
            non_negative("signature", "y", sig.y)?;
            non_negative("signature", "width", sig.width)?;
            non_negative("signature", "height", sig.height)?;
        }
        if let Some(qr) = &self.qr_code {
            non_negative("qrCode", "x", qr.x)?;
            non_negative("qrCode", "y", qr.y)?;
            non_negative("qrCode", "size", qr.size)?;
        }
        Ok(())
    }
}

fn non_negative(field: &str, attr: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CertError::Validation(format!(
            "layout.{field}.{attr} must be a non-negative number, got {value}"
        )))
    }
}

/// A stored certificate template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub background_url: String,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub is_default: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Body of a template creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTemplate {
    pub name: String,
    pub background_url: String,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub is_default: bool,
}

impl NewTemplate {
    pub fn new(name: impl Into<String>, background_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            background_url: background_url.into(),
            layout: None,
            is_default: false,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Validate and turn into a record owned by `created_by`.
    pub fn into_template(self, created_by: Uuid) -> Result<Template> {
        let name = required("name", self.name)?;
        let background_url = required("backgroundUrl", self.background_url)?;
        let layout = self.layout.unwrap_or_default();
        layout.validate()?;
        Ok(Template {
            id: Uuid::new_v4(),
            name,
            background_url,
            layout,
            is_default: self.is_default,
            created_by,
            created_at: Utc::now(),
        })
    }
}

/// Partial update of a template. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub background_url: Option<String>,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

impl TemplatePatch {
    pub fn set_default() -> Self {
        Self {
            is_default: Some(true),
            ..Self::default()
        }
    }

    pub fn apply(&self, template: &mut Template) -> Result<()> {
        if let Some(name) = &self.name {
            template.name = required("name", name.clone())?;
        }
        if let Some(url) = &self.background_url {
            template.background_url = required("backgroundUrl", url.clone())?;
        }
        if let Some(layout) = &self.layout {
            layout.validate()?;
            template.layout = layout.clone();
        }
        if let Some(is_default) = self.is_default {
            template.is_default = is_default;
        }
        Ok(())
    }
}

pub(crate) fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CertError::Validation(format!("Please add {field}")))
    } else {
        Ok(trimmed.to_string())
    }
}
