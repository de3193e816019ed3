//! Layout config – the intermediate representation between composition and
//! PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on the certificate page, in PDF points.

use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::layout::{Background, ComposedPage, Element};
use crate::style::FontFace;

/// How an image fills its box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    /// Stretch to the exact box.
    Fill,
    /// Scale to fit inside the box, preserving aspect ratio, centred.
    Contain,
}

/// A single-page document ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Width of the page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of the page in PDF points.
    pub page_height_pt: f32,
    /// Boxes in paint order; the first is the page background.
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font: FontFace,
    pub font_size: f32,
    pub color: [f32; 4],
    pub line_height: f32,
    /// Distance from the top of the glyph box to the baseline.
    pub ascent: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub fit: ImageFit,
}

impl LayoutConfig {
    /// Freeze a composed page, scaling layout units to points.
    pub fn from_page(page: &ComposedPage, config: &RenderConfig) -> Self {
        let s = config.pt_per_unit;
        let mut boxes = Vec::with_capacity(page.elements.len() + 1);

        let mut background = LayoutBox::new(0.0, 0.0, page.width * s, page.height * s);
        match &page.background {
            Background::Image(src) => {
                background.image = Some(ImageContent {
                    src: src.clone(),
                    fit: ImageFit::Fill,
                })
            }
            Background::Flat(color) => background.background_color = Some(color.to_rgba()),
        }
        boxes.push(background);

        for element in &page.elements {
            match element {
                Element::Text(t) => {
                    let mut b = LayoutBox::new(
                        t.frame.x * s,
                        t.frame.y * s,
                        t.frame.width * s,
                        t.frame.height * s,
                    );
                    let line_step = t.style.font_size * t.style.line_height * s;
                    b.text = Some(TextContent {
                        lines: t
                            .lines
                            .iter()
                            .enumerate()
                            .map(|(i, l)| TextLine {
                                text: l.text.clone(),
                                x_offset: l.x_offset * s,
                                y_offset: i as f32 * line_step,
                            })
                            .collect(),
                        font: t.style.font,
                        font_size: t.style.font_size * s,
                        color: t.style.color.to_rgba(),
                        line_height: line_step,
                        ascent: t.ascent * s,
                    });
                    boxes.push(b);
                }
                Element::Image(i) => {
                    let mut b = LayoutBox::new(
                        i.frame.x * s,
                        i.frame.y * s,
                        i.frame.width * s,
                        i.frame.height * s,
                    );
                    b.image = Some(ImageContent {
                        src: i.src.clone(),
                        fit: i.fit,
                    });
                    boxes.push(b);
                }
            }
        }

        Self {
            title: page.title.clone(),
            page_width_pt: config.page_width_pt(),
            page_height_pt: config.page_height_pt(),
            boxes,
        }
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            text: None,
            image: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontManager;
    use crate::layout::compose;
    use crate::samples::{self, PIXEL_PNG};
    use crate::template::Layout;

    fn frozen(layout: Layout) -> LayoutConfig {
        let config = RenderConfig::default().with_asset_roots(Vec::new());
        let page = compose(
            &samples::certificate(),
            &samples::template("T", layout),
            Some(PIXEL_PNG),
            &config,
            &FontManager::default(),
        )
        .unwrap();
        LayoutConfig::from_page(&page, &config)
    }

    #[test]
    fn scales_units_to_points() {
        let cfg = frozen(Layout::default());
        assert!((cfg.page_width_pt - 842.25).abs() < 0.01);
        let qr = cfg
            .boxes
            .iter()
            .find(|b| b.image.as_ref().map(|i| i.fit) == Some(ImageFit::Fill) && b.x > 0.0)
            .unwrap();
        assert!((qr.x - 600.0).abs() < 0.01);
        assert!((qr.width - 75.0).abs() < 0.01);
    }

    #[test]
    fn background_box_comes_first() {
        let cfg = frozen(Layout::empty());
        assert_eq!(cfg.boxes.len(), 1);
        let bg = &cfg.boxes[0];
        assert_eq!(bg.image.as_ref().map(|i| i.src.as_str()), Some(PIXEL_PNG));
        assert!((bg.height - cfg.page_height_pt).abs() < 0.01);
    }

    #[test]
    fn text_carries_the_face_ascent_in_points() {
        let cfg = frozen(Layout::default());
        let texts: Vec<&TextContent> = cfg.boxes.iter().filter_map(|b| b.text.as_ref()).collect();
        assert!(!texts.is_empty());
        for text in texts {
            assert!((text.ascent - text.font_size * 0.75).abs() < 0.01);
        }
    }

    #[test]
    fn json_round_trip_preserves_layout() {
        let cfg = frozen(Layout::default());
        let back = LayoutConfig::from_json(&cfg.to_json()).unwrap();
        assert_eq!(back, cfg);
    }
}
