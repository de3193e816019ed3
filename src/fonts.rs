//! Text measurement for alignment and wrapping.
//!
//! Certificate text is drawn with the bold builtin PDF faces. Widths come
//! from a loaded TTF/OTF (via `ttf-parser`) when one is registered for the
//! face, otherwise from an average-advance heuristic. [`FontManager::builtin`]
//! carries the metrics of the faces the renderer actually embeds.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use printpdf::BuiltinFont;

use crate::style::FontFace;

/// The builtin PDF font text in `face` is set in.
pub fn builtin_font(face: FontFace) -> BuiltinFont {
    match face {
        FontFace::Helvetica => BuiltinFont::HelveticaBold,
        FontFace::Times => BuiltinFont::TimesBold,
        FontFace::Courier => BuiltinFont::CourierBold,
    }
}

static BUILTIN_METRICS: LazyLock<Arc<FontManager>> = LazyLock::new(|| {
    let mut fonts = FontManager::new();
    for face in [FontFace::Helvetica, FontFace::Times, FontFace::Courier] {
        let bytes = builtin_font(face).get_subset_font().bytes;
        if let Err(e) = fonts.load_font(face, bytes) {
            log::warn!("Estimating widths for {face:?}: {e}");
        }
    }
    Arc::new(fonts)
});

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
}

/// Measures text for the builtin faces.
#[derive(Default, Clone)]
pub struct FontManager {
    fonts: HashMap<FontFace, FontData>,
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared metrics for the bold builtin faces.
    pub fn builtin() -> Arc<FontManager> {
        BUILTIN_METRICS.clone()
    }

    /// Register real metrics for `face` from TTF/OTF bytes.
    pub fn load_font(&mut self, face: FontFace, bytes: Vec<u8>) -> Result<(), String> {
        let parsed =
            ttf_parser::Face::parse(&bytes, 0).map_err(|e| format!("Failed to parse font: {e}"))?;
        let data = FontData {
            units_per_em: parsed.units_per_em() as f32,
            ascender: parsed.ascender() as f32,
            bytes,
        };
        self.fonts.insert(face, data);
        Ok(())
    }

    /// Width of `text` at `font_size`, in the same units as `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, face: FontFace) -> f32 {
        if let Some(data) = self.fonts.get(&face) {
            if let Ok(parsed) = ttf_parser::Face::parse(&data.bytes, 0) {
                let scale = font_size / data.units_per_em;
                return text
                    .chars()
                    .map(|ch| match parsed.glyph_index(ch) {
                        Some(gid) => parsed.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                        None => font_size * 0.5,
                    })
                    .sum();
            }
        }

        // Bold proportional faces average ~0.55 em per glyph; Courier is
        // fixed at 0.6 em.
        let avg = match face {
            FontFace::Courier => 0.6,
            FontFace::Times => 0.5,
            FontFace::Helvetica => 0.55,
        };
        text.chars().count() as f32 * font_size * avg
    }

    /// Distance from the top of a line box to the baseline.
    pub fn ascender(&self, font_size: f32, face: FontFace) -> f32 {
        match self.fonts.get(&face) {
            Some(data) if data.units_per_em > 0.0 => data.ascender * font_size / data.units_per_em,
            _ => font_size * 0.75,
        }
    }
}

/// Greedy word wrap against `max_width`. Hard newlines always break, and a
/// single word wider than the limit gets a line of its own.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    face: FontFace,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let space = fonts.measure_text_width(" ", font_size, face);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut width = 0.0;
        for word in paragraph.split_whitespace() {
            let advance = fonts.measure_text_width(word, font_size, face);
            if !line.is_empty() && width + space + advance > max_width {
                lines.push(std::mem::take(&mut line));
                width = 0.0;
            }
            if !line.is_empty() {
                line.push(' ');
                width += space;
            }
            line.push_str(word);
            width += advance;
        }
        lines.push(line);
    }
    lines
}
