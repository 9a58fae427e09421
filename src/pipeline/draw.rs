//! Backend-neutral page drawings and their serialisation with `printpdf`.
//!
//! The layout engine, the signature stamp and the page-number layer all
//! describe their output as [`PageDrawing`]s in PDF points (origin bottom
//! left). [`write_pdf`] turns a list of drawings into a complete document.

use crate::error::Xml2PdfError;
use crate::pipeline::fonts::FontSet;
use printpdf::{
    Line, LinePoint, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt,
};

/// One drawing primitive. Coordinates are in points.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Text with its baseline origin at (`x`, `y`).
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    /// Straight stroked line.
    Line {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
    },
    /// Stroked rectangle with its lower-left corner at (`x`, `y`).
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        width: f32,
    },
}

/// A page of drawing operations.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDrawing {
    pub width_pt: f32,
    pub height_pt: f32,
    pub ops: Vec<DrawOp>,
}

impl PageDrawing {
    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
            ops: Vec::new(),
        }
    }

    /// Lowest text baseline on the page, if any.
    pub fn lowest_text(&self) -> Option<f32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { y, .. } => Some(*y),
                _ => None,
            })
            .reduce(f32::min)
    }

    pub fn text(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Serialise drawings to PDF bytes, embedding `fonts` once.
pub fn write_pdf(
    title: &str,
    pages: &[PageDrawing],
    fonts: &FontSet,
) -> Result<Vec<u8>, Xml2PdfError> {
    let mut doc = PdfDocument::new(title);
    let doc_fonts = fonts.register(&mut doc)?;

    let mut pdf_pages = Vec::with_capacity(pages.len());
    for page in pages {
        let mut ops = Vec::with_capacity(page.ops.len() * 4);
        for op in &page.ops {
            match op {
                DrawOp::Text {
                    x,
                    y,
                    size,
                    bold,
                    text,
                } => doc_fonts.get(*bold).write_text(&mut ops, text, *size, *x, *y),
                DrawOp::Line { from, to, width } => {
                    stroke(&mut ops, &[*from, *to], false, *width);
                }
                DrawOp::Rect { x, y, w, h, width } => {
                    let corners = [(*x, *y), (*x + *w, *y), (*x + *w, *y + *h), (*x, *y + *h)];
                    stroke(&mut ops, &corners, true, *width);
                }
            }
        }
        pdf_pages.push(PdfPage::new(
            Mm::from(Pt(page.width_pt)),
            Mm::from(Pt(page.height_pt)),
            ops,
        ));
    }
    doc.pages = pdf_pages;

    let mut warnings = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if bytes.is_empty() {
        return Err(Xml2PdfError::Internal(format!(
            "PDF writer produced no output for '{}'",
            title
        )));
    }
    Ok(bytes)
}

fn stroke(ops: &mut Vec<Op>, points: &[(f32, f32)], closed: bool, width: f32) {
    ops.push(Op::SaveGraphicsState);
    ops.push(Op::SetOutlineThickness { pt: Pt(width) });
    ops.push(Op::DrawLine {
        line: Line {
            points: points
                .iter()
                .map(|&(x, y)| LinePoint {
                    p: Point { x: Pt(x), y: Pt(y) },
                    bezier: false,
                })
                .collect(),
            is_closed: closed,
        },
    });
    ops.push(Op::RestoreGraphicsState);
}
