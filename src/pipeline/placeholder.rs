//! The one-page document returned in place of a PDF that could not be
//! generated from bad input.

use crate::error::Xml2PdfError;
use crate::pipeline::draw::{write_pdf, DrawOp, PageDrawing};
use crate::pipeline::fonts::FontSet;

pub const PLACEHOLDER_MESSAGE: &str = "Error: PDF file not generated due to an error.";

/// US Letter, with the message near the top.
pub fn placeholder_pdf() -> Result<Vec<u8>, Xml2PdfError> {
    let mut page = PageDrawing::new(612.0, 792.0);
    page.ops.push(DrawOp::Text {
        x: 100.0,
        y: 750.0,
        size: 12.0,
        bold: false,
        text: PLACEHOLDER_MESSAGE.to_string(),
    });
    write_pdf("error", &[page], &FontSet::builtin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_single_page_pdf() {
        let pdf = placeholder_pdf().unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
