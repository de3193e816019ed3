//! Style resolver – turns a field's [`TextConfig`] plus the template's
//! [`GlobalStyle`] into the flat [`EffectiveStyle`] consumed by the layout
//! engine.
//!
//! Precedence for colour and alignment: field value, then the template's
//! `global` value, then the engine default (`#000000`, centre).

use serde::{Deserialize, Serialize};

use crate::template::{GlobalStyle, TextConfig};

/// Line height factor applied to every text block.
pub const LINE_HEIGHT: f32 = 1.2;

/// Horizontal alignment of a text block or box on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlign {
    pub fn as_css(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

/// Builtin PDF font family a layout `fontFamily` maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFace {
    Helvetica,
    Times,
    Courier,
}

impl FontFace {
    /// Map a CSS-ish family name onto one of the builtin faces.
    pub fn from_family(family: &str) -> Self {
        let lower = family.to_ascii_lowercase();
        if lower.contains("times") || lower.contains("georgia") || lower.trim() == "serif" {
            FontFace::Times
        } else if lower.contains("courier") || lower.contains("mono") {
            FontFace::Courier
        } else {
            FontFace::Helvetica
        }
    }

    pub fn css_stack(&self) -> &'static str {
        match self {
            FontFace::Helvetica => "'Helvetica', 'Arial', sans-serif",
            FontFace::Times => "'Times New Roman', 'Times', serif",
            FontFace::Courier => "'Courier New', 'Courier', monospace",
        }
    }
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        // from_str_radix accepts a leading `+`.
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()? as f32 / 255.0;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()? as f32 / 255.0;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()? as f32 / 255.0;
            Some(Self { r, g, b, a: 1.0 })
        } else if hex.len() == 3 {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()? as f32 / 255.0;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()? as f32 / 255.0;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()? as f32 / 255.0;
            Some(Self { r, g, b, a: 1.0 })
        } else {
            None
        }
    }

    pub fn to_rgba(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Lowercase `#rrggbb` form, used when emitting HTML.
    pub fn to_hex(self) -> String {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", c(self.r), c(self.g), c(self.b))
    }
}

/// Fully resolved style for one text field.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveStyle {
    pub color: Color,
    pub align: TextAlign,
    pub font_size: f32,
    pub font: FontFace,
    pub line_height: f32,
}

/// Resolve the effective style of a text field.
///
/// Colours that do not parse fall back to the next level of precedence.
pub fn resolve_text_style(field: &TextConfig, global: Option<&GlobalStyle>) -> EffectiveStyle {
    let global_color = global.and_then(|g| g.text_color.as_deref());
    let color = field
        .color
        .as_deref()
        .and_then(Color::from_hex)
        .or_else(|| global_color.and_then(Color::from_hex))
        .unwrap_or(Color::BLACK);

    let align = field
        .align
        .or_else(|| global.and_then(|g| g.text_align))
        .unwrap_or_default();

    EffectiveStyle {
        color,
        align,
        font_size: field.font_size,
        font: FontFace::from_family(&field.font_family),
        line_height: LINE_HEIGHT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> TextConfig {
        TextConfig::at(100.0, 200.0, 24.0)
    }

    #[test]
    fn engine_defaults_apply_without_overrides() {
        let style = resolve_text_style(&field(), None);
        assert_eq!(style.color, Color::BLACK);
        assert_eq!(style.align, TextAlign::Center);
    }

    #[test]
    fn global_overrides_engine_default() {
        let global = GlobalStyle {
            text_color: Some("#ff0000".into()),
            text_align: Some(TextAlign::Left),
        };
        let style = resolve_text_style(&field(), Some(&global));
        assert!((style.color.r - 1.0).abs() < 0.01);
        assert_eq!(style.align, TextAlign::Left);
    }

    #[test]
    fn field_overrides_global() {
        let global = GlobalStyle {
            text_color: Some("#ff0000".into()),
            text_align: Some(TextAlign::Left),
        };
        let mut f = field();
        f.color = Some("#0000ff".into());
        f.align = Some(TextAlign::Right);
        let style = resolve_text_style(&f, Some(&global));
        assert!((style.color.b - 1.0).abs() < 0.01);
        assert!(style.color.r < 0.01);
        assert_eq!(style.align, TextAlign::Right);
    }

    #[test]
    fn unparsable_field_colour_falls_through() {
        let global = GlobalStyle {
            text_color: Some("#00ff00".into()),
            text_align: None,
        };
        let mut f = field();
        f.color = Some("not-a-colour".into());
        let style = resolve_text_style(&f, Some(&global));
        assert!((style.color.g - 1.0).abs() < 0.01);
    }

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(Color::from_hex("#abc").unwrap().to_hex(), "#aabbcc");
        assert!(Color::from_hex("ff8800").is_some());
        assert!(Color::from_hex("#ff88").is_none());
    }

    #[test]
    fn signed_or_non_hex_colors_are_rejected() {
        assert!(Color::from_hex("#+f0000").is_none());
        assert!(Color::from_hex("#+ff").is_none());
        assert!(Color::from_hex("#00ff0g").is_none());
        assert!(Color::from_hex("#ééé").is_none());

        let global = GlobalStyle {
            text_color: Some("#00ff00".into()),
            text_align: None,
        };
        let mut f = field();
        f.color = Some("#+f0000".into());
        let style = resolve_text_style(&f, Some(&global));
        assert_eq!(style.color.to_hex(), "#00ff00");
    }

    #[test]
    fn family_mapping() {
        assert_eq!(FontFace::from_family("Times New Roman"), FontFace::Times);
        assert_eq!(FontFace::from_family("Courier"), FontFace::Courier);
        assert_eq!(FontFace::from_family("Helvetica"), FontFace::Helvetica);
        assert_eq!(FontFace::from_family("Great Vibes"), FontFace::Helvetica);
    }
}
