//! Signature placeholders and `/ByteRange` patching.
//!
//! A signature covers the whole file except the hex `/Contents` value:
//!
//! ```text
//! [0 ........ a]<0000 ... 0000>[b ............ end]
//!  first range   placeholder    second range
//! ByteRange = [0 a b end-b]
//! ```
//!
//! The dictionary is written with oversized placeholder values, the file is
//! serialised once, and both values are then patched in place without
//! changing any offsets.

use crate::error::Xml2PdfError;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// Bytes reserved for the DER-encoded CMS structure.
pub const SIGNATURE_SIZE: usize = 8192;

const BYTE_RANGE_MAX: i64 = 9_999_999_999;

/// Byte offsets of the two placeholders in a serialised document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    /// `[` .. `]` of the ByteRange array (end exclusive).
    pub byte_range: (usize, usize),
    /// `<` .. `>` of the Contents hex string (end exclusive).
    pub contents: (usize, usize),
}

impl Placeholder {
    /// The ByteRange values for a file of `len` bytes.
    pub fn range(&self, len: usize) -> [usize; 4] {
        let (start, end) = self.contents;
        [0, start, end, len - end]
    }
}

/// Signature dictionary with placeholder values.
pub fn signature_dictionary(name: &str, signing_time: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Sig".to_vec()));
    dict.set("Filter", Object::Name(b"Adobe.PPKLite".to_vec()));
    dict.set("SubFilter", Object::Name(b"adbe.pkcs7.detached".to_vec()));
    dict.set(
        "ByteRange",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(BYTE_RANGE_MAX),
            Object::Integer(BYTE_RANGE_MAX),
            Object::Integer(BYTE_RANGE_MAX),
        ]),
    );
    dict.set(
        "Contents",
        Object::String(vec![0u8; SIGNATURE_SIZE], StringFormat::Hexadecimal),
    );
    dict.set("M", Object::string_literal(signing_time));
    dict.set("Name", Object::String(pdf_text(name), StringFormat::Hexadecimal));
    dict
}

/// UTF-16BE with BOM, the PDF text-string form for non-Latin names.
fn pdf_text(text: &str) -> Vec<u8> {
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Add an invisible signature field on the last page, pointing at a fresh
/// signature dictionary. Returns the signature dictionary id.
pub fn add_signature_field(
    doc: &mut Document,
    name: &str,
    signing_time: &str,
) -> Result<ObjectId, Xml2PdfError> {
    let fail = |detail: String| Xml2PdfError::SigningFailed { detail };
    let last_page = doc
        .get_pages()
        .values()
        .last()
        .copied()
        .ok_or_else(|| fail("document has no pages".into()))?;

    let sig_id = doc.add_object(signature_dictionary(name, signing_time));

    let mut widget = Dictionary::new();
    widget.set("Type", Object::Name(b"Annot".to_vec()));
    widget.set("Subtype", Object::Name(b"Widget".to_vec()));
    widget.set("FT", Object::Name(b"Sig".to_vec()));
    widget.set("T", Object::string_literal("Signature1"));
    widget.set("V", Object::Reference(sig_id));
    widget.set(
        "Rect",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
        ]),
    );
    widget.set("F", Object::Integer(132));
    widget.set("P", Object::Reference(last_page));
    let widget_id = doc.add_object(widget);

    // Page annotations.
    let annots = doc
        .get_dictionary(last_page)
        .ok()
        .and_then(|page| page.get(b"Annots").ok().cloned());
    let annots = match annots {
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(widget_id));
            Object::Array(items)
        }
        Some(Object::Reference(id)) => {
            if let Ok(Object::Array(items)) = doc.get_object_mut(id) {
                items.push(Object::Reference(widget_id));
            }
            Object::Reference(id)
        }
        _ => Object::Array(vec![Object::Reference(widget_id)]),
    };
    doc.get_dictionary_mut(last_page)
        .map_err(|e| fail(format!("cannot update last page: {}", e)))?
        .set("Annots", annots);

    // Catalog AcroForm.
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| fail(format!("document has no catalog: {}", e)))?;
    let mut form = Dictionary::new();
    form.set("Fields", Object::Array(vec![Object::Reference(widget_id)]));
    form.set("SigFlags", Object::Integer(3));
    let form_id = doc.add_object(form);
    doc.get_dictionary_mut(catalog_id)
        .map_err(|e| fail(format!("cannot update catalog: {}", e)))?
        .set("AcroForm", Object::Reference(form_id));

    Ok(sig_id)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Locate both placeholders in a serialised document.
pub fn locate(pdf: &[u8]) -> Result<Placeholder, Xml2PdfError> {
    let fail = |detail: &str| Xml2PdfError::SigningFailed {
        detail: detail.to_string(),
    };

    let marker = format!("{} {} {}", BYTE_RANGE_MAX, BYTE_RANGE_MAX, BYTE_RANGE_MAX);
    let at = find(pdf, marker.as_bytes()).ok_or_else(|| fail("ByteRange placeholder not found"))?;
    let open = pdf[..at]
        .iter()
        .rposition(|&b| b == b'[')
        .ok_or_else(|| fail("ByteRange array not opened"))?;
    let close = at
        + pdf[at..]
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| fail("ByteRange array not closed"))?;

    let mut zeros = Vec::with_capacity(SIGNATURE_SIZE * 2 + 1);
    zeros.push(b'<');
    zeros.resize(SIGNATURE_SIZE * 2 + 1, b'0');
    let start = find(pdf, &zeros).ok_or_else(|| fail("Contents placeholder not found"))?;
    let end = start + zeros.len();
    if pdf.get(end) != Some(&b'>') {
        return Err(fail("Contents placeholder not terminated"));
    }

    Ok(Placeholder {
        byte_range: (open, close + 1),
        contents: (start, end + 1),
    })
}

/// Write the real ByteRange, space-padded to the placeholder width.
pub fn patch_byte_range(pdf: &mut [u8], at: &Placeholder) -> Result<[usize; 4], Xml2PdfError> {
    let range = at.range(pdf.len());
    let (start, end) = at.byte_range;
    let text = format!("[{} {} {} {}]", range[0], range[1], range[2], range[3]);
    if text.len() > end - start {
        return Err(Xml2PdfError::SigningFailed {
            detail: format!("ByteRange {} does not fit its placeholder", text),
        });
    }
    let slot = &mut pdf[start..end];
    slot.fill(b' ');
    slot[..text.len()].copy_from_slice(text.as_bytes());
    Ok(range)
}

/// The bytes a signature over `range` covers.
pub fn covered_bytes(pdf: &[u8], range: [usize; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(range[1] + range[3]);
    out.extend_from_slice(&pdf[range[0]..range[0] + range[1]]);
    out.extend_from_slice(&pdf[range[2]..range[2] + range[3]]);
    out
}

/// Write `signature` as hex into the Contents placeholder.
pub fn embed_signature(
    pdf: &mut [u8],
    at: &Placeholder,
    signature: &[u8],
) -> Result<(), Xml2PdfError> {
    let (start, end) = at.contents;
    let capacity = end - start - 2;
    let hex: String = signature.iter().map(|b| format!("{:02X}", b)).collect();
    if hex.len() > capacity {
        return Err(Xml2PdfError::SigningFailed {
            detail: format!(
                "signature of {} bytes exceeds the reserved {} bytes",
                signature.len(),
                capacity / 2
            ),
        });
    }
    pdf[start + 1..start + 1 + hex.len()].copy_from_slice(hex.as_bytes());
    Ok(())
}
