//! The visual signature stamp.
//!
//! A bordered box reading
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Документ подписан электронной подписью  │
//! │  Подписант: <name>                       │
//! │  Дата и время: dd.mm.YYYY HH:MM:SS       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! is painted horizontally centred on the last page ([`StampPolicy::LastPage`])
//! or on every page ([`StampPolicy::EveryPage`]).
//!
//! ## Placement
//!
//! The lowest text-showing position on the page is found by interpreting
//! its content stream (`cm`, `q`/`Q`, text matrices, `Tj`/`TJ`/`'`/`"`).
//! The box goes `gap_pt` below that line when the band between it and
//! `bottom_offset_pt` can hold the box; otherwise (no text, or the page is
//! too full) it sits `bottom_offset_pt` above the bottom edge.

use crate::config::{StampOptions, StampPolicy};
use crate::error::Xml2PdfError;
use crate::pipeline::draw::{DrawOp, PageDrawing};
use crate::pipeline::fonts::FontSet;
use crate::pipeline::overlay::{merge_layers, page_box, page_ids};
use chrono::{DateTime, FixedOffset};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, info};

pub const STAMP_TITLE: &str = "Документ подписан электронной подписью";
pub const STAMP_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

const PADDING: f32 = 8.0;
const BORDER_WIDTH: f32 = 1.0;
const MIN_FONT_SIZE: f32 = 5.0;

/// Where the stamp box goes on one page. Lower-left corner, page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    /// True when placed beneath measured text rather than at the fallback.
    pub below_text: bool,
}

/// Paints signature stamps.
#[derive(Debug, Clone)]
pub struct Stamper {
    options: StampOptions,
    fonts: FontSet,
}

impl Stamper {
    pub fn new(options: StampOptions, fonts: FontSet) -> Self {
        Self { options, fonts }
    }

    /// The three stamp lines.
    pub fn lines(signer: &str, signed_at: &DateTime<FixedOffset>) -> [String; 3] {
        [
            STAMP_TITLE.to_string(),
            format!("Подписант: {}", signer),
            format!("Дата и время: {}", signed_at.format(STAMP_TIME_FORMAT)),
        ]
    }

    /// Stamp `pdf`. Blocking; call from `spawn_blocking`.
    ///
    /// # Errors
    /// [`Xml2PdfError::StampFailed`] when the PDF cannot be read or written.
    pub fn apply(
        &self,
        pdf: &[u8],
        signer: &str,
        signed_at: &DateTime<FixedOffset>,
    ) -> Result<Vec<u8>, Xml2PdfError> {
        let fail = |detail: String| Xml2PdfError::StampFailed { detail };
        let doc = Document::load_mem(pdf).map_err(|e| fail(format!("cannot read PDF: {}", e)))?;
        let pages = page_ids(&doc);
        if pages.is_empty() {
            return Err(fail("document has no pages".into()));
        }

        let targets: Vec<usize> = match self.options.policy {
            StampPolicy::LastPage => vec![pages.len() - 1],
            StampPolicy::EveryPage => (0..pages.len()).collect(),
        };
        let lines = Self::lines(signer, signed_at);

        let layers = targets
            .into_iter()
            .map(|index| {
                let page_id = pages[index];
                let bounds = page_box(&doc, page_id);
                let floor = text_floor(&doc, page_id, bounds[1] + self.options.ignore_text_below_pt);
                let placement = self.placement(bounds, floor);
                debug!(
                    "Stamp on page {}: lowest text {:?}, box at ({:.1}, {:.1}){}",
                    index + 1,
                    floor,
                    placement.x,
                    placement.y,
                    if placement.below_text { "" } else { " (fallback)" }
                );
                (index, self.drawing(bounds, placement, &lines))
            })
            .collect();

        let out = merge_layers(pdf, layers, &self.fonts, fail)?;
        info!(
            "Stamped {} for '{}' ({:?})",
            if self.options.policy == StampPolicy::LastPage {
                "last page".to_string()
            } else {
                format!("{} pages", pages.len())
            },
            signer,
            self.options.policy
        );
        Ok(out)
    }

    /// Box position for a page with MediaBox `bounds` whose lowest text
    /// baseline is `floor`.
    pub fn placement(&self, bounds: [f32; 4], floor: Option<f32>) -> Placement {
        let [llx, lly, urx, _] = bounds;
        let o = &self.options;
        let x = llx + ((urx - llx) - o.width_pt) / 2.0;
        let fallback = lly + o.bottom_offset_pt;

        match floor {
            Some(floor) if floor - o.gap_pt - o.height_pt >= fallback => Placement {
                x,
                y: floor - o.gap_pt - o.height_pt,
                below_text: true,
            },
            _ => Placement {
                x,
                y: fallback,
                below_text: false,
            },
        }
    }

    fn drawing(&self, bounds: [f32; 4], at: Placement, lines: &[String; 3]) -> PageDrawing {
        let [llx, lly, urx, ury] = bounds;
        let o = &self.options;
        let mut page = PageDrawing::new(urx - llx, ury - lly);
        // Layer space: origin at the MediaBox corner.
        let (x, y) = (at.x - llx, at.y - lly);

        page.ops.push(DrawOp::Rect {
            x,
            y,
            w: o.width_pt,
            h: o.height_pt,
            width: BORDER_WIDTH,
        });

        let inner = o.width_pt - 2.0 * PADDING;
        let title_size = self.fit(&lines[0], true, o.title_size_pt, inner);
        let title_width = self.fonts.bold().text_width(&lines[0], title_size);
        let mut baseline = y + o.height_pt - PADDING - title_size;
        page.ops.push(DrawOp::Text {
            x: x + (o.width_pt - title_width) / 2.0,
            y: baseline,
            size: title_size,
            bold: true,
            text: lines[0].clone(),
        });

        for line in &lines[1..] {
            let size = self.fit(line, false, o.body_size_pt, inner);
            baseline -= o.body_size_pt * 1.6;
            page.ops.push(DrawOp::Text {
                x: x + PADDING,
                y: baseline,
                size,
                bold: false,
                text: line.clone(),
            });
        }
        page
    }

    /// Largest size ≤ `size` at which `text` fits in `width`.
    fn fit(&self, text: &str, bold: bool, size: f32, width: f32) -> f32 {
        let natural = self.fonts.face(bold).text_width(text, size);
        if natural <= width || natural == 0.0 {
            size
        } else {
            (size * width / natural).max(MIN_FONT_SIZE)
        }
    }
}

// ── Text floor measurement ───────────────────────────────────────────────

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `a × b` for PDF's row-vector affine matrices.
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(|o| o.as_float().ok()).collect()
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    let n = numbers(operands);
    (n.len() == 6).then(|| [n[0], n[1], n[2], n[3], n[4], n[5]])
}

fn shows_text(operands: &[Object]) -> bool {
    operands.iter().any(|o| match o {
        Object::String(bytes, _) => !bytes.is_empty(),
        Object::Array(items) => items
            .iter()
            .any(|i| matches!(i, Object::String(bytes, _) if !bytes.is_empty())),
        _ => false,
    })
}

/// Lowest baseline (page space) at which the page shows text, ignoring
/// anything below `ignore_below`. `None` for pages without text or with an
/// unreadable content stream.
pub fn text_floor(doc: &Document, page_id: ObjectId, ignore_below: f32) -> Option<f32> {
    let data = doc.get_page_content(page_id).ok()?;
    let content = Content::decode(&data).ok()?;

    let mut ctm = IDENTITY;
    let mut stack: Vec<Matrix> = Vec::new();
    let mut tm = IDENTITY;
    let mut tlm = IDENTITY;
    let mut leading = 0.0f32;
    let mut lowest: Option<f32> = None;

    for op in &content.operations {
        let args = &op.operands;
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => ctm = stack.pop().unwrap_or(IDENTITY),
            "cm" => {
                if let Some(m) = matrix(args) {
                    ctm = multiply(&m, &ctm);
                }
            }
            "BT" => {
                tm = IDENTITY;
                tlm = IDENTITY;
            }
            "TL" => {
                if let Some(&l) = numbers(args).first() {
                    leading = l;
                }
            }
            "Td" | "TD" => {
                let n = numbers(args);
                if n.len() == 2 {
                    if op.operator == "TD" {
                        leading = -n[1];
                    }
                    tlm = multiply(&translate(n[0], n[1]), &tlm);
                    tm = tlm;
                }
            }
            "Tm" => {
                if let Some(m) = matrix(args) {
                    tlm = m;
                    tm = m;
                }
            }
            "T*" => {
                tlm = multiply(&translate(0.0, -leading), &tlm);
                tm = tlm;
            }
            "Tj" | "TJ" | "'" | "\"" => {
                if op.operator == "'" || op.operator == "\"" {
                    tlm = multiply(&translate(0.0, -leading), &tlm);
                    tm = tlm;
                }
                if shows_text(args) {
                    let y = multiply(&tm, &ctm)[5];
                    if y >= ignore_below {
                        lowest = Some(lowest.map_or(y, |l: f32| l.min(y)));
                    }
                }
            }
            _ => {}
        }
    }
    lowest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::overlay::tests::test_pdf;
    use chrono::TimeZone;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};

    fn at() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
            .unwrap()
    }

    fn stamper(policy: StampPolicy) -> Stamper {
        Stamper::new(
            StampOptions {
                policy,
                ..StampOptions::default()
            },
            FontSet::builtin(),
        )
    }

    fn page_with_ops(ops: Vec<Operation>) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
        });
        (doc, page_id)
    }

    fn op(name: &str, nums: &[f32]) -> Operation {
        Operation::new(name, nums.iter().map(|n| Object::Real(*n)).collect())
    }

    fn show(text: &str) -> Operation {
        Operation::new("Tj", vec![Object::string_literal(text)])
    }

    #[test]
    fn lines_are_formatted() {
        let lines = Stamper::lines("Иванов И. И.", &at());
        assert_eq!(lines[0], STAMP_TITLE);
        assert_eq!(lines[1], "Подписант: Иванов И. И.");
        assert_eq!(lines[2], "Дата и время: 05.03.2024 14:07:09");
    }

    #[test]
    fn floor_follows_td_and_tm() {
        let (doc, page) = page_with_ops(vec![
            op("BT", &[]),
            op("Td", &[72.0, 700.0]),
            show("first"),
            op("Td", &[0.0, -20.0]),
            show("second"),
            op("ET", &[]),
            op("BT", &[]),
            op("Tm", &[1.0, 0.0, 0.0, 1.0, 50.0, 400.0]),
            show("third"),
            op("ET", &[]),
        ]);
        assert_eq!(text_floor(&doc, page, 0.0), Some(400.0));
    }

    #[test]
    fn floor_applies_ctm_and_restores_it() {
        let (doc, page) = page_with_ops(vec![
            op("q", &[]),
            op("cm", &[1.0, 0.0, 0.0, 1.0, 0.0, -100.0]),
            op("BT", &[]),
            op("Td", &[10.0, 500.0]),
            show("moved"),
            op("ET", &[]),
            op("Q", &[]),
            op("BT", &[]),
            op("Td", &[10.0, 450.0]),
            show("plain"),
            op("ET", &[]),
        ]);
        assert_eq!(text_floor(&doc, page, 0.0), Some(400.0));
    }

    #[test]
    fn floor_handles_scaled_ctm() {
        let (doc, page) = page_with_ops(vec![
            op("cm", &[0.5, 0.0, 0.0, 0.5, 0.0, 0.0]),
            op("BT", &[]),
            op("Td", &[0.0, 600.0]),
            show("half"),
            op("ET", &[]),
        ]);
        assert_eq!(text_floor(&doc, page, 0.0), Some(300.0));
    }

    #[test]
    fn floor_handles_leading_operators() {
        let (doc, page) = page_with_ops(vec![
            op("BT", &[]),
            op("TD", &[0.0, -12.0]),
            op("Td", &[0.0, 712.0]),
            show("a"),
            op("T*", &[]),
            Operation::new("'", vec![Object::string_literal("c")]),
            op("ET", &[]),
        ]);
        // 700, then 688 via T*, then 676 via '.
        assert_eq!(text_floor(&doc, page, 0.0), Some(676.0));
    }

    #[test]
    fn floor_ignores_footer_band_and_empty_strings() {
        let (doc, page) = page_with_ops(vec![
            op("BT", &[]),
            op("Td", &[0.0, 500.0]),
            show("body"),
            op("Td", &[0.0, -300.0]),
            show(""),
            op("Td", &[0.0, -180.0]),
            show("footer"),
            op("ET", &[]),
        ]);
        assert_eq!(text_floor(&doc, page, 0.0), Some(20.0));
        assert_eq!(text_floor(&doc, page, 30.0), Some(500.0));
    }

    #[test]
    fn page_without_text_has_no_floor() {
        let (doc, page) = page_with_ops(vec![op("q", &[]), op("Q", &[])]);
        assert_eq!(text_floor(&doc, page, 0.0), None);
    }

    #[test]
    fn placement_goes_below_text_when_room() {
        let s = stamper(StampPolicy::LastPage);
        let p = s.placement([0.0, 0.0, 600.0, 842.0], Some(400.0));
        assert!(p.below_text);
        assert_eq!(p.x, 150.0);
        assert_eq!(p.y, 400.0 - 10.0 - 60.0);
    }

    #[test]
    fn placement_falls_back_when_full_or_empty() {
        let s = stamper(StampPolicy::LastPage);
        let full = s.placement([0.0, 0.0, 600.0, 842.0], Some(80.0));
        assert!(!full.below_text);
        assert_eq!(full.y, 30.0);
        let empty = s.placement([0.0, 0.0, 600.0, 842.0], None);
        assert_eq!(empty.y, 30.0);
    }

    #[test]
    fn placement_respects_offset_media_box() {
        let s = stamper(StampPolicy::LastPage);
        let p = s.placement([100.0, 50.0, 700.0, 892.0], None);
        assert_eq!(p.x, 250.0);
        assert_eq!(p.y, 80.0);
    }

    #[test]
    fn last_page_policy_stamps_only_last_page() {
        let pdf = test_pdf(3);
        let out = stamper(StampPolicy::LastPage)
            .apply(&pdf, "ТЕСТ", &at())
            .unwrap();
        let doc = Document::load_mem(&out).unwrap();
        let pages = page_ids(&doc);
        assert_eq!(pages.len(), 3);
        let has_layer = |id: ObjectId| {
            let content = Content::decode(&doc.get_page_content(id).unwrap()).unwrap();
            content.operations.iter().any(|o| o.operator == "Do")
        };
        assert!(!has_layer(pages[0]));
        assert!(!has_layer(pages[1]));
        assert!(has_layer(pages[2]));
    }

    #[test]
    fn every_page_policy_stamps_all_pages() {
        let pdf = test_pdf(2);
        let out = stamper(StampPolicy::EveryPage)
            .apply(&pdf, "ТЕСТ", &at())
            .unwrap();
        let doc = Document::load_mem(&out).unwrap();
        for id in page_ids(&doc) {
            let content = Content::decode(&doc.get_page_content(id).unwrap()).unwrap();
            assert!(content.operations.iter().any(|o| o.operator == "Do"));
        }
    }

    #[test]
    fn stamping_never_reduces_page_count() {
        for n in [1, 2, 5] {
            let out = stamper(StampPolicy::LastPage)
                .apply(&test_pdf(n), "ТЕСТ", &at())
                .unwrap();
            let doc = Document::load_mem(&out).unwrap();
            assert!(doc.get_pages().len() >= n);
        }
    }

    #[test]
    fn unreadable_pdf_is_stamp_failure() {
        let err = stamper(StampPolicy::LastPage)
            .apply(b"%PDF-1.4 garbage", "ТЕСТ", &at())
            .unwrap_err();
        assert!(matches!(err, Xml2PdfError::StampFailed { .. }));
    }

    #[test]
    fn long_signer_name_is_shrunk_to_fit() {
        let s = stamper(StampPolicy::LastPage);
        let size = s.fit(&"W".repeat(200), false, 9.0, 284.0);
        assert!(size < 9.0);
        assert!(size >= MIN_FONT_SIZE);
    }
}
