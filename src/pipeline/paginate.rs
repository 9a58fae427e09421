//! Running page numbers (`Страница N из M`) drawn onto every page.

use crate::config::{mm_to_pt, PageNumberOptions};
use crate::error::Xml2PdfError;
use crate::pipeline::draw::{DrawOp, PageDrawing};
use crate::pipeline::fonts::FontSet;
use crate::pipeline::overlay::{merge_layers, page_box, page_ids};
use lopdf::Document;
use tracing::{debug, info};

/// Adds page numbers to a finished PDF.
#[derive(Debug, Clone)]
pub struct PageNumberer {
    options: PageNumberOptions,
    margin_right_mm: f32,
    fonts: FontSet,
}

impl PageNumberer {
    /// `margin_right_mm` positions right-aligned labels when
    /// `options.x_pt` is unset.
    pub fn new(options: PageNumberOptions, margin_right_mm: f32, fonts: FontSet) -> Self {
        Self {
            options,
            margin_right_mm,
            fonts,
        }
    }

    /// Number every page. Returns the input unchanged when disabled.
    ///
    /// # Errors
    /// [`Xml2PdfError::PageNumberingFailed`] when the PDF cannot be read or written.
    pub fn apply(&self, pdf: &[u8]) -> Result<Vec<u8>, Xml2PdfError> {
        if !self.options.enabled {
            debug!("Page numbering disabled");
            return Ok(pdf.to_vec());
        }
        let fail = |detail: String| Xml2PdfError::PageNumberingFailed { detail };
        let doc = Document::load_mem(pdf).map_err(|e| fail(format!("cannot read PDF: {}", e)))?;
        let pages = page_ids(&doc);
        let total = pages.len();
        if total == 0 {
            return Err(fail("document has no pages".into()));
        }

        let size = self.options.font_size_pt;
        let face = self.fonts.regular();
        let layers = pages
            .iter()
            .enumerate()
            .map(|(index, &page_id)| {
                let [llx, lly, urx, ury] = page_box(&doc, page_id);
                let width = urx - llx;
                let text = self.options.label(index + 1, total);
                let x = self.options.x_pt.unwrap_or_else(|| {
                    width - mm_to_pt(self.margin_right_mm) - face.text_width(&text, size)
                });
                let mut layer = PageDrawing::new(width, ury - lly);
                layer.ops.push(DrawOp::Text {
                    x,
                    y: self.options.y_pt,
                    size,
                    bold: false,
                    text,
                });
                (index, layer)
            })
            .collect();

        let out = merge_layers(pdf, layers, &self.fonts, fail)?;
        info!("Numbered {} page(s)", total);
        Ok(out)
    }
}
