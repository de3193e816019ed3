//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).
//!
//! Output is byte-for-byte reproducible: resources get fixed names and the
//! trailer `/ID` is derived from the document body.
//!
//! [`Watchdog`] runs a [`Rasterizer`] on its own thread, gives up after the
//! configured bound, and refuses new work while too many abandoned workers
//! are still running.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use printpdf::*;
use regex::bytes::Regex;
use sha2::{Digest, Sha256};

use crate::assets::parse_data_uri;
use crate::error::{CertError, Result};
use crate::fonts::builtin_font;
use crate::layout_config::{ImageFit, LayoutBox, LayoutConfig, TextContent};
use crate::style::FontFace;

const PT_TO_MM: f32 = 0.352778;

/// Turns a frozen layout into PDF bytes.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, layout: &LayoutConfig) -> Result<Vec<u8>>;
}

/// The in-process printpdf backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintPdfRasterizer;

impl Rasterizer for PrintPdfRasterizer {
    fn rasterize(&self, layout: &LayoutConfig) -> Result<Vec<u8>> {
        render_pdf(layout)
    }
}

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Time-bounded execution of a [`Rasterizer`].
///
/// Clones share the count of abandoned workers.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    max_stalled: usize,
    stalled: Arc<AtomicUsize>,
}

/// Marks a worker finished on exit, including on unwind, and releases its
/// stalled slot if it had been abandoned.
struct WorkerExit {
    state: Arc<AtomicU8>,
    stalled: Arc<AtomicUsize>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if self.state.swap(FINISHED, Ordering::SeqCst) == ABANDONED {
            self.stalled.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Watchdog {
    pub fn new(timeout: Duration, max_stalled: usize) -> Self {
        Self {
            timeout,
            max_stalled,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Timed-out workers that have not yet exited.
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Run `rasterizer` on a dedicated thread, failing with `RenderFailure`
    /// if it errors, panics, or exceeds the timeout.
    ///
    /// A timed-out worker is detached and its result discarded. While
    /// `max_stalled` of them are still running, new renders are refused.
    pub fn run(&self, rasterizer: Arc<dyn Rasterizer>, layout: LayoutConfig) -> Result<Vec<u8>> {
        let stalled = self.stalled();
        if stalled >= self.max_stalled {
            log::error!("{stalled} timed-out renders still running, refusing new work");
            return Err(CertError::RenderFailure(format!(
                "renderer saturated: {stalled} timed-out renders still running"
            )));
        }

        let state = Arc::new(AtomicU8::new(RUNNING));
        let exit = WorkerExit {
            state: state.clone(),
            stalled: self.stalled.clone(),
        };
        let (tx, rx) = mpsc::sync_channel(1);
        let worker = thread::Builder::new()
            .name("certforge-render".to_string())
            .spawn(move || {
                let _exit = exit;
                let _ = tx.send(rasterizer.rasterize(&layout));
            })
            .map_err(|e| CertError::RenderFailure(format!("could not start renderer: {e}")))?;

        let timeout = self.timeout;
        match rx.recv_timeout(timeout) {
            Ok(result) => {
                let _ = worker.join();
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.stalled.fetch_add(1, Ordering::SeqCst);
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    // Finished between the timeout and here.
                    self.stalled.fetch_sub(1, Ordering::SeqCst);
                }
                log::error!("Rendering exceeded {timeout:?}, abandoning worker");
                Err(CertError::RenderFailure(format!(
                    "rendering timed out after {timeout:?}"
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                Err(CertError::RenderFailure(
                    "renderer stopped without producing a document".to_string(),
                ))
            }
        }
    }
}

/// An image registered with the document, plus its source pixel size.
struct Embedded {
    id: XObjectId,
    px: (u32, u32),
}

/// Render a LayoutConfig into a single-page PDF.
///
/// Images whose `src` is not a base64 data URI, or whose bytes cannot be
/// decoded, are skipped with a `log::warn`.
pub fn render_pdf(config: &LayoutConfig) -> Result<Vec<u8>> {
    if !(config.page_width_pt > 0.0 && config.page_height_pt > 0.0) {
        return Err(CertError::RenderFailure(format!(
            "invalid page size {}x{} pt",
            config.page_width_pt, config.page_height_pt
        )));
    }

    let mut doc = PdfDocument::new(&config.title);
    let images = embed_images(&mut doc, config);
    embed_fonts(&mut doc, config)?;

    let page_h = config.page_height_pt;
    let mut ops = Vec::new();
    for lbox in &config.boxes {
        if let Some(color) = &lbox.background_color {
            fill_rect(&mut ops, lbox, page_h, color);
        }
        if let Some(img) = &lbox.image {
            if let Some(embedded) = images.get(img.src.as_str()) {
                place_image(&mut ops, lbox, img.fit, embedded, page_h);
            }
        }
        if let Some(text) = &lbox.text {
            write_lines(&mut ops, lbox, text, page_h);
        }
    }

    doc.with_pages(vec![PdfPage::new(
        Mm(config.page_width_pt * PT_TO_MM),
        Mm(page_h * PT_TO_MM),
        ops,
    )]);
    let bytes = pin_document_id(doc.save(&PdfSaveOptions::default(), &mut Vec::new()));
    log::debug!("Rasterized '{}' ({} bytes)", config.title, bytes.len());
    Ok(bytes)
}

/// Register every distinct image source once, in sorted order, as `Im0`,
/// `Im1`, ...
fn embed_images<'a>(doc: &mut PdfDocument, config: &'a LayoutConfig) -> HashMap<&'a str, Embedded> {
    let sources: BTreeSet<&str> = config
        .boxes
        .iter()
        .filter_map(|b| b.image.as_ref().map(|i| i.src.as_str()))
        .collect();

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut embedded = HashMap::new();
    for src in sources {
        let decoded = parse_data_uri(src).and_then(|bytes| {
            let px = ::image::load_from_memory(&bytes)
                .map(|img| (img.width(), img.height()))
                .map_err(|e| format!("decode error: {e}"))?;
            let raw = RawImage::decode_from_bytes(&bytes, &mut warnings)
                .map_err(|e| format!("PDF encode error: {e}"))?;
            Ok((raw, px))
        });
        match decoded {
            Ok((raw, px)) => {
                let id = XObjectId(format!("Im{}", embedded.len()));
                doc.resources
                    .xobjects
                    .map
                    .insert(id.clone(), XObject::Image(raw));
                embedded.insert(src, Embedded { id, px });
            }
            Err(e) => log::warn!("Skipping image: {e}"),
        }
    }
    embedded
}

/// Resource name of an embedded face; printpdf also uses it as `/BaseFont`.
fn font_id(face: FontFace) -> FontId {
    FontId(builtin_font(face).get_id().to_string())
}

/// Parse the bundled Win-1252 cut of `face` for embedding.
fn load_face(face: FontFace) -> Result<ParsedFont> {
    let subset = builtin_font(face).get_subset_font();
    ParsedFont::from_bytes(&subset.bytes, 0, &mut Vec::new())
        .ok_or_else(|| CertError::RenderFailure(format!("could not load the {face:?} font")))
}

/// Embed each face some text box is set in.
fn embed_fonts(doc: &mut PdfDocument, config: &LayoutConfig) -> Result<()> {
    let used: BTreeSet<&str> = config
        .boxes
        .iter()
        .filter_map(|b| b.text.as_ref())
        .map(|t| builtin_font(t.font).get_id())
        .collect();
    for face in [FontFace::Helvetica, FontFace::Times, FontFace::Courier] {
        if used.contains(builtin_font(face).get_id()) {
            doc.resources.fonts.map.insert(font_id(face), load_face(face)?);
        }
    }
    Ok(())
}

static TRAILER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/ID\s*\[\s*\(([A-Z]{32})\)\s*\(([A-Z]{32})\)\s*\]").expect("static regex is valid")
});

/// Replace printpdf's random trailer `/ID` pair with a digest of everything
/// before it. The replacement has the same length, so xref offsets hold.
fn pin_document_id(mut bytes: Vec<u8>) -> Vec<u8> {
    let found = TRAILER_ID
        .captures_iter(&bytes)
        .last()
        .and_then(|c| Some((c.get(0)?.start(), c.get(1)?.range(), c.get(2)?.range())));
    let Some((start, first, second)) = found else {
        log::warn!("No trailer id found, leaving document id as generated");
        return bytes;
    };
    let id = hex::encode_upper(&Sha256::digest(&bytes[..start])[..16]);
    bytes[first].copy_from_slice(id.as_bytes());
    bytes[second].copy_from_slice(id.as_bytes());
    bytes
}

fn rgb(c: &[f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn corner(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Placement of an image inside its box, in top-left-origin points.
fn fit_image(lbox: &LayoutBox, fit: ImageFit, px_w: u32, px_h: u32) -> (f32, f32, f32, f32) {
    if px_w == 0 || px_h == 0 || fit == ImageFit::Fill {
        return (lbox.x, lbox.y, lbox.width, lbox.height);
    }
    let scale = (lbox.width / px_w as f32).min(lbox.height / px_h as f32);
    let (w, h) = (px_w as f32 * scale, px_h as f32 * scale);
    (
        lbox.x + (lbox.width - w) / 2.0,
        lbox.y + (lbox.height - h) / 2.0,
        w,
        h,
    )
}

fn fill_rect(ops: &mut Vec<Op>, lbox: &LayoutBox, page_h: f32, color: &[f32; 4]) {
    // PDF y grows upwards from the bottom edge.
    let (left, right) = (lbox.x, lbox.x + lbox.width);
    let (top, bottom) = (page_h - lbox.y, page_h - lbox.y - lbox.height);
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: vec![
                    corner(left, bottom),
                    corner(right, bottom),
                    corner(right, top),
                    corner(left, top),
                ],
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

fn place_image(ops: &mut Vec<Op>, lbox: &LayoutBox, fit: ImageFit, img: &Embedded, page_h: f32) {
    let (px_w, px_h) = img.px;
    let (x, y, w, h) = fit_image(lbox, fit, px_w, px_h);
    // 72 dpi maps one pixel to one point.
    let scale = |target: f32, px: u32| if px > 0 { target / px as f32 } else { 1.0 };
    ops.push(Op::UseXobject {
        id: img.id.clone(),
        transform: XObjectTransform {
            translate_x: Some(Pt(x)),
            translate_y: Some(Pt(page_h - y - h)),
            rotate: None,
            scale_x: Some(scale(w, px_w)),
            scale_y: Some(scale(h, px_h)),
            dpi: Some(72.0),
        },
    });
}

fn write_lines(ops: &mut Vec<Op>, lbox: &LayoutBox, text: &TextContent, page_h: f32) {
    let font = font_id(text.font);
    // Half-leading above the glyphs, then the face's ascender to the baseline.
    let baseline_drop = (text.line_height - text.font_size) / 2.0 + text.ascent;

    for line in text.lines.iter().filter(|l| !l.text.is_empty()) {
        ops.extend([
            Op::StartTextSection,
            Op::SetTextCursor {
                pos: Point {
                    x: Pt(lbox.x + line.x_offset),
                    y: Pt(page_h - lbox.y - line.y_offset - baseline_drop),
                },
            },
            Op::SetFontSize {
                size: Pt(text.font_size),
                font: font.clone(),
            },
            Op::SetLineHeight {
                lh: Pt(text.line_height),
            },
            Op::SetFillColor {
                col: rgb(&text.color),
            },
            Op::WriteText {
                items: vec![TextItem::Text(line.text.clone())],
                font: font.clone(),
            },
            Op::EndTextSection,
        ]);
    }
}
