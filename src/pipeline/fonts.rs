//! Font loading and text measurement.
//!
//! Fonts are resolved once, when the pipeline is built: configured TrueType
//! files first, then a system DejaVu Sans, then the PDF base-14 Helvetica.
//! Helvetica has no Cyrillic glyphs, so falling back to it is logged as a
//! warning rather than treated as an error.
//!
//! The raw font bytes are kept so every document can embed its own copy
//! (`printpdf` fonts are per-document) and so widths can be measured with
//! `ttf-parser` without touching the PDF writer.

use crate::config::FontConfig;
use crate::error::Xml2PdfError;
use printpdf::{BuiltinFont, FontId, Op, ParsedFont, PdfDocument, Pt, TextItem, TextMatrix};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/dejavu",
    "/usr/share/fonts/TTF",
    "/Library/Fonts",
    "C:\\Windows\\Fonts",
];

const SYSTEM_REGULAR: &[&str] = &["DejaVuSans.ttf", "Arial.ttf", "arial.ttf"];
const SYSTEM_BOLD: &[&str] = &["DejaVuSans-Bold.ttf", "Arial Bold.ttf", "arialbd.ttf"];

/// Average advance of Helvetica glyphs as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.52;
const HELVETICA_BOLD_AVG_ADVANCE: f32 = 0.56;

/// A TrueType font read from disk.
#[derive(Debug)]
pub struct TrueTypeFont {
    path: PathBuf,
    data: Vec<u8>,
    units_per_em: f32,
}

impl TrueTypeFont {
    /// Read and validate a `.ttf` file.
    pub fn load(path: &Path) -> Result<Self, Xml2PdfError> {
        let data = std::fs::read(path).map_err(|e| Xml2PdfError::FontLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| Xml2PdfError::FontLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let units_per_em = f32::from(face.units_per_em());
        Ok(Self {
            path: path.to_path_buf(),
            data,
            units_per_em,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One typeface: embedded TrueType or a base-14 font.
#[derive(Debug, Clone)]
pub enum Face {
    TrueType(Arc<TrueTypeFont>),
    Builtin(BuiltinFont),
}

impl Face {
    /// Advance width of `text` at `size` points.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        match self {
            Face::TrueType(font) => match ttf_parser::Face::parse(&font.data, 0) {
                Ok(face) => {
                    let units: f32 = text
                        .chars()
                        .map(|ch| {
                            let glyph = face.glyph_index(ch).unwrap_or(ttf_parser::GlyphId(0));
                            f32::from(face.glyph_hor_advance(glyph).unwrap_or(0))
                        })
                        .sum();
                    units / font.units_per_em * size
                }
                Err(_) => approximate_width(text, size, HELVETICA_AVG_ADVANCE),
            },
            Face::Builtin(BuiltinFont::HelveticaBold) => {
                approximate_width(text, size, HELVETICA_BOLD_AVG_ADVANCE)
            }
            Face::Builtin(_) => approximate_width(text, size, HELVETICA_AVG_ADVANCE),
        }
    }

    /// Whether every character of `text` has a glyph.
    pub fn covers(&self, text: &str) -> bool {
        match self {
            Face::TrueType(font) => match ttf_parser::Face::parse(&font.data, 0) {
                Ok(face) => text
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .all(|c| face.glyph_index(c).is_some()),
                Err(_) => false,
            },
            Face::Builtin(_) => text.chars().all(|c| (c as u32) < 0x100),
        }
    }
}

fn approximate_width(text: &str, size: f32, ratio: f32) -> f32 {
    text.chars().count() as f32 * size * ratio
}

/// The regular/bold pair used by every generated page.
#[derive(Debug, Clone)]
pub struct FontSet {
    regular: Face,
    bold: Face,
}

impl FontSet {
    /// Resolve the configured fonts.
    ///
    /// A configured path that cannot be read is an error; discovery misses
    /// are not.
    pub fn load(config: &FontConfig) -> Result<Self, Xml2PdfError> {
        let regular = match &config.regular {
            Some(path) => Some(TrueTypeFont::load(path)?),
            None if config.discover_system => discover(SYSTEM_REGULAR),
            None => None,
        };
        let bold = match &config.bold {
            Some(path) => Some(TrueTypeFont::load(path)?),
            None if config.discover_system => discover(SYSTEM_BOLD),
            None => None,
        };

        let set = match (regular, bold) {
            (Some(regular), Some(bold)) => {
                debug!(
                    "Fonts: regular={}, bold={}",
                    regular.path().display(),
                    bold.path().display()
                );
                Self {
                    regular: Face::TrueType(Arc::new(regular)),
                    bold: Face::TrueType(Arc::new(bold)),
                }
            }
            (Some(regular), None) => {
                debug!("Fonts: regular={} (no bold face)", regular.path().display());
                let face = Face::TrueType(Arc::new(regular));
                Self {
                    regular: face.clone(),
                    bold: face,
                }
            }
            (None, _) => {
                warn!("No TrueType font found; using Helvetica, Cyrillic text will not render");
                Self::builtin()
            }
        };
        Ok(set)
    }

    /// Base-14 Helvetica only.
    pub fn builtin() -> Self {
        Self {
            regular: Face::Builtin(BuiltinFont::Helvetica),
            bold: Face::Builtin(BuiltinFont::HelveticaBold),
        }
    }

    pub fn regular(&self) -> &Face {
        &self.regular
    }

    pub fn bold(&self) -> &Face {
        &self.bold
    }

    pub fn face(&self, bold: bool) -> &Face {
        if bold {
            &self.bold
        } else {
            &self.regular
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.regular, Face::Builtin(_))
    }

    /// Embed both faces into `doc`.
    pub(crate) fn register(&self, doc: &mut PdfDocument) -> Result<DocFonts, Xml2PdfError> {
        let regular = register_face(doc, &self.regular)?;
        let bold = match (&self.regular, &self.bold) {
            (Face::TrueType(a), Face::TrueType(b)) if Arc::ptr_eq(a, b) => regular.clone(),
            _ => register_face(doc, &self.bold)?,
        };
        Ok(DocFonts { regular, bold })
    }
}

fn discover(names: &[&str]) -> Option<TrueTypeFont> {
    SYSTEM_FONT_DIRS
        .iter()
        .flat_map(|dir| names.iter().map(move |name| Path::new(dir).join(name)))
        .filter(|path| path.is_file())
        .find_map(|path| match TrueTypeFont::load(&path) {
            Ok(font) => Some(font),
            Err(e) => {
                debug!("Skipping system font: {}", e);
                None
            }
        })
}

fn register_face(doc: &mut PdfDocument, face: &Face) -> Result<FontRef, Xml2PdfError> {
    match face {
        Face::TrueType(font) => {
            let mut warnings = Vec::new();
            let parsed = ParsedFont::from_bytes(&font.data, 0, &mut warnings).ok_or_else(|| {
                Xml2PdfError::FontLoadFailed {
                    path: font.path.clone(),
                    detail: "not a usable TrueType font".into(),
                }
            })?;
            Ok(FontRef::Embedded(doc.add_font(&parsed)))
        }
        Face::Builtin(builtin) => Ok(FontRef::Builtin(builtin.clone())),
    }
}

/// Fonts registered in one `printpdf` document.
#[derive(Debug, Clone)]
pub(crate) struct DocFonts {
    pub regular: FontRef,
    pub bold: FontRef,
}

impl DocFonts {
    pub fn get(&self, bold: bool) -> &FontRef {
        if bold {
            &self.bold
        } else {
            &self.regular
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FontRef {
    Embedded(FontId),
    Builtin(BuiltinFont),
}

impl FontRef {
    /// Emit a text section drawing `text` with its baseline origin at
    /// (`x`, `y`) points.
    pub fn write_text(&self, ops: &mut Vec<Op>, text: &str, size: f32, x: f32, y: f32) {
        ops.push(Op::StartTextSection);
        match self {
            FontRef::Embedded(id) => {
                ops.push(Op::SetFontSize {
                    size: Pt(size),
                    font: id.clone(),
                });
                ops.push(Op::SetTextMatrix {
                    matrix: TextMatrix::Translate(Pt(x), Pt(y)),
                });
                ops.push(Op::WriteText {
                    items: vec![TextItem::Text(text.to_string())],
                    font: id.clone(),
                });
            }
            FontRef::Builtin(font) => {
                ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(size),
                    font: font.clone(),
                });
                ops.push(Op::SetTextMatrix {
                    matrix: TextMatrix::Translate(Pt(x), Pt(y)),
                });
                ops.push(Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(text.to_string())],
                    font: font.clone(),
                });
            }
        }
        ops.push(Op::EndTextSection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_width_scales_with_size() {
        let face = Face::Builtin(BuiltinFont::Helvetica);
        let small = face.text_width("abcd", 10.0);
        let large = face.text_width("abcd", 20.0);
        assert!((large - 2.0 * small).abs() < 0.01);
        assert_eq!(face.text_width("", 10.0), 0.0);
    }

    #[test]
    fn builtin_does_not_cover_cyrillic() {
        let face = Face::Builtin(BuiltinFont::Helvetica);
        assert!(face.covers("Page 1"));
        assert!(!face.covers("Страница"));
    }

    #[test]
    fn configured_font_missing_is_error() {
        let config = FontConfig {
            regular: Some(PathBuf::from("/nonexistent/font.ttf")),
            bold: None,
            discover_system: false,
        };
        let err = FontSet::load(&config).unwrap_err();
        assert!(matches!(err, Xml2PdfError::FontLoadFailed { .. }));
    }

    #[test]
    fn garbage_font_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        let err = TrueTypeFont::load(&path).unwrap_err();
        assert!(matches!(err, Xml2PdfError::FontLoadFailed { .. }));
    }

    #[test]
    fn no_discovery_falls_back_to_helvetica() {
        let config = FontConfig {
            regular: None,
            bold: None,
            discover_system: false,
        };
        let set = FontSet::load(&config).unwrap();
        assert!(set.is_builtin());
    }

    #[test]
    fn discovered_font_measures_cyrillic() {
        let set = FontSet::load(&FontConfig::default()).unwrap();
        if set.is_builtin() {
            return; // no system fonts on this machine
        }
        assert!(set.regular().covers("Страница"));
        let w = set.regular().text_width("Страница", 10.0);
        assert!(w > 20.0 && w < 80.0, "width {w}");
        assert!(set.bold().text_width("Страница", 10.0) >= w);
    }
}
