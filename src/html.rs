//! HTML export of a composed page.
//!
//! The markup mirrors what the rasterizer draws: one absolutely positioned
//! element per placed field on a fixed-size page, pixel units throughout.

use std::fmt::Write as _;

use crate::layout::{Background, ComposedPage, Element, Frame};
use crate::layout_config::ImageFit;

/// Escape text for use in element content and double-quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn num(v: f32) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn frame_css(f: &Frame) -> String {
    format!(
        "position:absolute;left:{}px;top:{}px;width:{}px;height:{}px",
        num(f.x),
        num(f.y),
        num(f.width),
        num(f.height)
    )
}

impl ComposedPage {
    /// Standalone HTML document for this page.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "<!DOCTYPE html>");
        let _ = writeln!(out, "<html>");
        let _ = writeln!(out, "<head>");
        let _ = writeln!(out, "<meta charset=\"utf-8\">");
        let _ = writeln!(out, "<title>{}</title>", escape(&self.title));
        let _ = writeln!(
            out,
            "<style>body{{margin:0}}.page{{position:relative;width:{}px;height:{}px;overflow:hidden}}</style>",
            num(self.width),
            num(self.height)
        );
        let _ = writeln!(out, "</head>");
        let _ = writeln!(out, "<body>");
        let _ = writeln!(out, "<div class=\"page\">");

        let page = Frame {
            x: 0.0,
            y: 0.0,
            width: self.width,
            height: self.height,
        };
        match &self.background {
            Background::Image(src) => {
                let _ = writeln!(
                    out,
                    "<img class=\"background\" src=\"{}\" style=\"{};object-fit:fill\">",
                    escape(src),
                    frame_css(&page)
                );
            }
            Background::Flat(color) => {
                let _ = writeln!(
                    out,
                    "<div class=\"background\" style=\"{};background:{}\"></div>",
                    frame_css(&page),
                    color.to_hex()
                );
            }
        }

        for element in &self.elements {
            match element {
                Element::Text(t) => {
                    let body = t
                        .lines
                        .iter()
                        .map(|l| escape(&l.text))
                        .collect::<Vec<_>>()
                        .join("<br>");
                    let _ = writeln!(
                        out,
                        "<div class=\"{}\" style=\"{};color:{};font-size:{}px;font-family:{};font-weight:bold;text-align:{};line-height:{}\">{}</div>",
                        t.field.key(),
                        frame_css(&t.frame),
                        t.style.color.to_hex(),
                        num(t.style.font_size),
                        t.style.font.css_stack(),
                        t.style.align.as_css(),
                        num(t.style.line_height),
                        body
                    );
                }
                Element::Image(i) => {
                    let fit = match i.fit {
                        ImageFit::Fill => "fill",
                        ImageFit::Contain => "contain",
                    };
                    let class = match i.kind {
                        crate::layout::ImageKind::Signature => "signature",
                        crate::layout::ImageKind::QrCode => "qrCode",
                    };
                    let _ = writeln!(
                        out,
                        "<img class=\"{class}\" src=\"{}\" style=\"{};object-fit:{fit}\">",
                        escape(&i.src),
                        frame_css(&i.frame)
                    );
                }
            }
        }

        let _ = writeln!(out, "</div>");
        let _ = writeln!(out, "</body>");
        let _ = writeln!(out, "</html>");
        out
    }
}
