//! Compositor – places a certificate's fields on the fixed landscape page.
//!
//! Every element is an absolutely positioned Taffy node under a root the size
//! of the page. Text is wrapped and measured first so each node gets a
//! definite size; Taffy then resolves the insets (full-width centring,
//! right-anchored boxes) into page coordinates.

use taffy::{
    AvailableSpace, Dimension, LengthPercentageAuto, NodeId, Position, Rect, Size, Style,
    TaffyError, TaffyTree,
};

use crate::assets;
use crate::certificate::Certificate;
use crate::config::RenderConfig;
use crate::error::{CertError, Result};
use crate::fonts::{wrap_text, FontManager};
use crate::layout_config::ImageFit;
use crate::style::{resolve_text_style, Color, EffectiveStyle, TextAlign};
use crate::template::{Template, TextConfig, TextField};

const WHITE: Color = Color {
    r: 1.0,
    g: 1.0,
    b: 1.0,
    a: 1.0,
};

/// A rectangle in layout units, origin at the page's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// Image data URI stretched over the whole page.
    Image(String),
    /// Flat fill used when the template background cannot be resolved.
    Flat(Color),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Offset from the frame's left edge.
    pub x_offset: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub field: TextField,
    /// Full text before wrapping, label included.
    pub text: String,
    pub lines: Vec<PlacedLine>,
    pub frame: Frame,
    pub style: EffectiveStyle,
    /// Top of a line to its baseline, from the face's metrics.
    pub ascent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Signature,
    QrCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub kind: ImageKind,
    pub src: String,
    pub frame: Frame,
    pub fit: ImageFit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(PlacedText),
    Image(PlacedImage),
}

/// One fully placed certificate page, in paint order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPage {
    pub title: String,
    pub width: f32,
    pub height: f32,
    pub background: Background,
    pub elements: Vec<Element>,
}

impl ComposedPage {
    pub fn text(&self, field: TextField) -> Option<&PlacedText> {
        self.elements.iter().find_map(|e| match e {
            Element::Text(t) if t.field == field => Some(t),
            _ => None,
        })
    }

    pub fn image(&self, kind: ImageKind) -> Option<&PlacedImage> {
        self.elements.iter().find_map(|e| match e {
            Element::Image(i) if i.kind == kind => Some(i),
            _ => None,
        })
    }
}

/// What a node turns into once Taffy has placed it.
enum Pending {
    Text {
        field: TextField,
        text: String,
        lines: Vec<(String, f32)>,
        style: EffectiveStyle,
        ascent: f32,
    },
    Image {
        kind: ImageKind,
        src: String,
        fit: ImageFit,
    },
}

/// Printed value of a text field, label prefix included.
pub fn field_text(cert: &Certificate, field: TextField, cfg: &TextConfig) -> String {
    let value = match field {
        TextField::RecipientName => cert.recipient_name.clone(),
        TextField::CourseTitle => cert.course_title.clone(),
        TextField::Description => cert.description.clone(),
        TextField::Date => format_issue_date(cert),
        TextField::CertificateId => cert.certificate_id.clone(),
    };
    match field.default_label() {
        Some(default) => format!("{}{}", cfg.label.as_deref().unwrap_or(default), value),
        None => value,
    }
}

pub fn format_issue_date(cert: &Certificate) -> String {
    cert.issue_date.format("%-m/%-d/%Y").to_string()
}

fn layout_err(e: TaffyError) -> CertError {
    CertError::RenderFailure(format!("layout: {e}"))
}

fn px(v: f32) -> LengthPercentageAuto {
    LengthPercentageAuto::Length(v)
}

fn absolute(inset: Rect<LengthPercentageAuto>, width: Dimension, height: f32) -> Style {
    Style {
        position: Position::Absolute,
        inset,
        size: Size {
            width,
            height: Dimension::Length(height),
        },
        ..Default::default()
    }
}

fn inset(left: LengthPercentageAuto, right: LengthPercentageAuto, top: f32) -> Rect<LengthPercentageAuto> {
    Rect {
        left,
        right,
        top: px(top),
        bottom: LengthPercentageAuto::Auto,
    }
}

struct PageBuilder<'a> {
    taffy: TaffyTree<()>,
    nodes: Vec<(NodeId, Pending)>,
    config: &'a RenderConfig,
    fonts: &'a FontManager,
}

impl<'a> PageBuilder<'a> {
    fn new(config: &'a RenderConfig, fonts: &'a FontManager) -> Self {
        Self {
            taffy: TaffyTree::new(),
            nodes: Vec::new(),
            config,
            fonts,
        }
    }

    fn add_text(&mut self, field: TextField, text: String, cfg: &TextConfig, style: EffectiveStyle) -> Result<()> {
        let page_w = self.config.page_width;
        let max_width = match style.align {
            TextAlign::Center => page_w,
            TextAlign::Left => page_w - cfg.x,
            TextAlign::Right => cfg.x,
        };
        let wrapped = wrap_text(&text, style.font_size, style.font, max_width, self.fonts);
        let lines: Vec<(String, f32)> = wrapped
            .into_iter()
            .map(|l| {
                let w = self.fonts.measure_text_width(&l, style.font_size, style.font);
                (l, w)
            })
            .collect();
        let widest = lines.iter().map(|(_, w)| *w).fold(0.0_f32, f32::max);
        let height = lines.len() as f32 * style.font_size * style.line_height;

        let node_style = match style.align {
            TextAlign::Center => absolute(inset(px(0.0), px(0.0), cfg.y), Dimension::Auto, height),
            TextAlign::Left => absolute(
                inset(px(cfg.x), LengthPercentageAuto::Auto, cfg.y),
                Dimension::Length(widest),
                height,
            ),
            TextAlign::Right => absolute(
                inset(LengthPercentageAuto::Auto, px(page_w - cfg.x), cfg.y),
                Dimension::Length(widest),
                height,
            ),
        };
        let ascent = self.fonts.ascender(style.font_size, style.font);
        let node = self.taffy.new_leaf(node_style).map_err(layout_err)?;
        self.nodes.push((
            node,
            Pending::Text {
                field,
                text,
                lines,
                style,
                ascent,
            },
        ));
        Ok(())
    }

    fn add_image(&mut self, kind: ImageKind, src: String, fit: ImageFit, style: Style) -> Result<()> {
        let node = self.taffy.new_leaf(style).map_err(layout_err)?;
        self.nodes.push((node, Pending::Image { kind, src, fit }));
        Ok(())
    }

    fn finish(mut self, title: String, background: Background) -> Result<ComposedPage> {
        let (page_w, page_h) = (self.config.page_width, self.config.page_height);
        let children: Vec<NodeId> = self.nodes.iter().map(|(id, _)| *id).collect();
        let root = self
            .taffy
            .new_with_children(
                Style {
                    size: Size {
                        width: Dimension::Length(page_w),
                        height: Dimension::Length(page_h),
                    },
                    ..Default::default()
                },
                &children,
            )
            .map_err(layout_err)?;
        self.taffy
            .compute_layout(
                root,
                Size {
                    width: AvailableSpace::Definite(page_w),
                    height: AvailableSpace::Definite(page_h),
                },
            )
            .map_err(layout_err)?;

        let mut elements = Vec::with_capacity(self.nodes.len());
        for (node, pending) in self.nodes {
            let l = self.taffy.layout(node).map_err(layout_err)?;
            let frame = Frame {
                x: l.location.x,
                y: l.location.y,
                width: l.size.width,
                height: l.size.height,
            };
            elements.push(match pending {
                Pending::Text {
                    field,
                    text,
                    lines,
                    style,
                    ascent,
                } => Element::Text(PlacedText {
                    field,
                    text,
                    lines: lines
                        .into_iter()
                        .map(|(text, width)| {
                            let slack = (frame.width - width).max(0.0);
                            let x_offset = match style.align {
                                TextAlign::Left => 0.0,
                                TextAlign::Center => slack / 2.0,
                                TextAlign::Right => slack,
                            };
                            PlacedLine {
                                text,
                                x_offset,
                                width,
                            }
                        })
                        .collect(),
                    frame,
                    style,
                    ascent,
                }),
                Pending::Image { kind, src, fit } => Element::Image(PlacedImage {
                    kind,
                    src,
                    frame,
                    fit,
                }),
            });
        }

        Ok(ComposedPage {
            title,
            width: page_w,
            height: page_h,
            background,
            elements,
        })
    }
}

/// Compose the page for `cert` on `template`.
///
/// `qr` is the caller-supplied QR image as a data URI; without it, or without
/// a `qrCode` entry in the layout, no QR element is placed. Unresolvable
/// background or signature assets degrade silently.
pub fn compose(
    cert: &Certificate,
    template: &Template,
    qr: Option<&str>,
    config: &RenderConfig,
    fonts: &FontManager,
) -> Result<ComposedPage> {
    let layout = &template.layout;
    let global = layout.global.as_ref();
    let mut builder = PageBuilder::new(config, fonts);

    let background = match assets::resolve_image(&template.background_url, &config.asset_roots) {
        Some(uri) => Background::Image(uri),
        None => Background::Flat(Color::from_hex(&config.fallback_background).unwrap_or(WHITE)),
    };

    for field in TextField::ALL {
        let Some(cfg) = layout.text(field) else {
            continue;
        };
        let style = resolve_text_style(cfg, global);
        builder.add_text(field, field_text(cert, field, cfg), cfg, style)?;
    }

    if let Some(sig) = &layout.signature {
        match assets::resolve_first(&config.signature_candidates, &config.asset_roots) {
            Some(src) => {
                let left = match sig.align {
                    Some(TextAlign::Center) => px((config.page_width - sig.width) / 2.0),
                    Some(TextAlign::Right) => LengthPercentageAuto::Auto,
                    Some(TextAlign::Left) | None => px(sig.x),
                };
                let right = match sig.align {
                    Some(TextAlign::Right) => px(config.page_width - sig.x),
                    _ => LengthPercentageAuto::Auto,
                };
                builder.add_image(
                    ImageKind::Signature,
                    src,
                    ImageFit::Contain,
                    absolute(inset(left, right, sig.y), Dimension::Length(sig.width), sig.height),
                )?;
            }
            None => log::debug!("No signature asset found, skipping signature"),
        }
    }

    if let (Some(qr_cfg), Some(src)) = (&layout.qr_code, qr) {
        builder.add_image(
            ImageKind::QrCode,
            src.to_string(),
            ImageFit::Fill,
            absolute(
                inset(px(qr_cfg.x), LengthPercentageAuto::Auto, qr_cfg.y),
                Dimension::Length(qr_cfg.size),
                qr_cfg.size,
            ),
        )?;
    }

    builder.finish(config.title.clone(), background)
}
