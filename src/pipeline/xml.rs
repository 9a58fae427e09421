//! XML parsing into an arena tree with iterative, document-order lookups.
//!
//! The submission is decoded once (BOM, then the `encoding="…"` declaration,
//! then UTF-8), parsed with `quick-xml` into a flat `Vec` of nodes, and every
//! lookup afterwards is a pre-order walk over that arena with an explicit
//! stack. Deeply nested input therefore cannot overflow the call stack.
//!
//! Tags are matched on their local name: `<ns:UniqueID>` matches `UniqueID`.

use crate::error::Xml2PdfError;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::bytes::Regex;
use tracing::debug;

static ENCODING_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap()
});

#[derive(Debug)]
struct Node {
    name: String,
    text: String,
    children: Vec<usize>,
}

/// A parsed XML document.
#[derive(Debug)]
pub struct XmlDocument {
    nodes: Vec<Node>,
}

/// A borrowed handle to one element of an [`XmlDocument`].
#[derive(Debug, Clone, Copy)]
pub struct XmlElement<'a> {
    doc: &'a XmlDocument,
    idx: usize,
}

impl XmlDocument {
    /// Parse raw submission bytes.
    ///
    /// Any syntax error, an unclosed element, a second root element or an
    /// undecodable byte sequence is reported as
    /// [`Xml2PdfError::MalformedInput`].
    pub fn parse(bytes: &[u8]) -> Result<Self, Xml2PdfError> {
        let text = decode(bytes)?;
        Self::parse_str(&text)
    }

    /// Parse an already-decoded document.
    pub fn parse_str(text: &str) -> Result<Self, Xml2PdfError> {
        let mut reader = Reader::from_str(text);
        reader.check_end_names(true);

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut root_seen = false;

        loop {
            let event = reader.read_event().map_err(|e| malformed(&reader, e))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    // Surface attribute syntax errors now rather than never.
                    for attr in e.attributes() {
                        attr.map_err(|err| Xml2PdfError::MalformedInput {
                            detail: format!("bad attribute in <{name}>: {err}"),
                        })?;
                    }

                    let idx = nodes.len();
                    match stack.last() {
                        Some(&parent) => nodes[parent].children.push(idx),
                        None if root_seen => {
                            return Err(Xml2PdfError::MalformedInput {
                                detail: format!("second root element <{name}>"),
                            })
                        }
                        None => root_seen = true,
                    }
                    nodes.push(Node {
                        name,
                        text: String::new(),
                        children: Vec::new(),
                    });
                    if !is_empty {
                        stack.push(idx);
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(ref e) => {
                    let chunk = e.unescape().map_err(|err| Xml2PdfError::MalformedInput {
                        detail: err.to_string(),
                    })?;
                    match stack.last() {
                        Some(&current) => nodes[current].text.push_str(&chunk),
                        None if chunk.trim().is_empty() => {}
                        None => {
                            return Err(Xml2PdfError::MalformedInput {
                                detail: "text outside the root element".into(),
                            })
                        }
                    }
                }
                Event::CData(ref e) => {
                    if let Some(&current) = stack.last() {
                        nodes[current]
                            .text
                            .push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctype.
                _ => {}
            }
        }

        if let Some(&open) = stack.last() {
            return Err(Xml2PdfError::MalformedInput {
                detail: format!("unexpected end of document inside <{}>", nodes[open].name),
            });
        }
        if nodes.is_empty() {
            return Err(Xml2PdfError::MalformedInput {
                detail: "document has no root element".into(),
            });
        }

        debug!("Parsed XML: {} elements", nodes.len());
        Ok(Self { nodes })
    }

    /// The document element.
    pub fn root(&self) -> XmlElement<'_> {
        XmlElement { doc: self, idx: 0 }
    }

    /// Number of elements in the document.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'a> XmlElement<'a> {
    /// Local tag name.
    pub fn name(&self) -> &'a str {
        &self.doc.nodes[self.idx].name
    }

    /// Trimmed direct text, `None` when empty.
    pub fn text(&self) -> Option<&'a str> {
        let text = self.doc.nodes[self.idx].text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Direct child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = XmlElement<'a>> + 'a {
        let doc = self.doc;
        doc.nodes[self.idx]
            .children
            .iter()
            .map(move |&idx| XmlElement { doc, idx })
    }

    /// Pre-order walk over this element and everything below it.
    pub fn descendants(&self) -> Descendants<'a> {
        Descendants {
            doc: self.doc,
            stack: vec![self.idx],
        }
    }

    /// Text of the first element named `tag` (this one included) with
    /// non-empty text, in document order.
    pub fn find_first(&self, tag: &str) -> Option<&'a str> {
        self.descendants()
            .filter(|el| el.name() == tag)
            .find_map(|el| el.text())
    }

    /// Text of every element named `tag` with non-empty text.
    pub fn find_all(&self, tag: &str) -> Vec<&'a str> {
        self.descendants()
            .filter(|el| el.name() == tag)
            .filter_map(|el| el.text())
            .collect()
    }

    /// Every element named `tag` strictly below this one.
    pub fn elements(&self, tag: &'a str) -> impl Iterator<Item = XmlElement<'a>> + 'a {
        let own = self.idx;
        self.descendants()
            .filter(move |el| el.idx != own && el.name() == tag)
    }
}

/// Iterator returned by [`XmlElement::descendants`].
pub struct Descendants<'a> {
    doc: &'a XmlDocument,
    stack: Vec<usize>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = XmlElement<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.stack.pop()?;
        self.stack
            .extend(self.doc.nodes[idx].children.iter().rev().copied());
        Some(XmlElement { doc: self.doc, idx })
    }
}

/// Decode submission bytes to text: BOM first, then the XML declaration,
/// then UTF-8. Undecodable input is malformed.
fn decode(bytes: &[u8]) -> Result<String, Xml2PdfError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((enc, bom_len)) => (enc, &bytes[bom_len..]),
        None => {
            let declared = ENCODING_DECL
                .captures(&bytes[..bytes.len().min(256)])
                .and_then(|caps| caps.get(1))
                .and_then(|label| Encoding::for_label(label.as_bytes()));
            (declared.unwrap_or(encoding_rs::UTF_8), bytes)
        }
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or_else(|| Xml2PdfError::MalformedInput {
            detail: format!("document is not valid {}", encoding.name()),
        })
}

fn malformed(reader: &Reader<&[u8]>, err: quick_xml::Error) -> Xml2PdfError {
    Xml2PdfError::MalformedInput {
        detail: format!("{} at byte {}", err, reader.buffer_position()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<Root>
  <A><Name>  first  </Name></A>
  <Name></Name>
  <B><Name>second</Name><Name>third</Name></B>
  <ns:Tagged xmlns:ns="urn:x">scoped</ns:Tagged>
</Root>"#;

    #[test]
    fn first_match_in_document_order() {
        let doc = XmlDocument::parse_str(SAMPLE).unwrap();
        assert_eq!(doc.root().find_first("Name"), Some("first"));
    }

    #[test]
    fn find_all_skips_empty_elements() {
        let doc = XmlDocument::parse_str(SAMPLE).unwrap();
        assert_eq!(
            doc.root().find_all("Name"),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn missing_tag_is_none() {
        let doc = XmlDocument::parse_str(SAMPLE).unwrap();
        assert_eq!(doc.root().find_first("Nope"), None);
        assert!(doc.root().find_all("Nope").is_empty());
    }

    #[test]
    fn namespace_prefix_ignored() {
        let doc = XmlDocument::parse_str(SAMPLE).unwrap();
        assert_eq!(doc.root().find_first("Tagged"), Some("scoped"));
    }

    #[test]
    fn elements_excludes_self() {
        let doc = XmlDocument::parse_str("<Name><Name>x</Name></Name>").unwrap();
        assert_eq!(doc.root().elements("Name").count(), 1);
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 20_000;
        let mut xml = String::with_capacity(depth * 8);
        for _ in 0..depth {
            xml.push_str("<n>");
        }
        xml.push_str("<UniqueID>deep</UniqueID>");
        for _ in 0..depth {
            xml.push_str("</n>");
        }
        let doc = XmlDocument::parse_str(&xml).unwrap();
        assert_eq!(doc.root().find_first("UniqueID"), Some("deep"));
    }

    #[test]
    fn malformed_inputs() {
        for bad in [
            "",
            "not xml at all",
            "<a><b></a>",
            "<a>",
            "<a></a><b></b>",
            "<a>&unknown;</a>",
        ] {
            let err = XmlDocument::parse_str(bad).unwrap_err();
            assert!(
                matches!(err, Xml2PdfError::MalformedInput { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn declared_windows_1251_is_decoded() {
        let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode("<r><Name>Иван</Name></r>");
        let mut bytes = br#"<?xml version="1.0" encoding="windows-1251"?>"#.to_vec();
        bytes.extend_from_slice(&encoded);
        let doc = XmlDocument::parse(&bytes).unwrap();
        assert_eq!(doc.root().find_first("Name"), Some("Иван"));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = XmlDocument::parse(b"<r>\xff\xfe\xfd</r>").unwrap_err();
        assert!(matches!(err, Xml2PdfError::MalformedInput { .. }));
    }

    #[test]
    fn cdata_counts_as_text() {
        let doc = XmlDocument::parse_str("<r><v><![CDATA[a < b]]></v></r>").unwrap();
        assert_eq!(doc.root().find_first("v"), Some("a < b"));
    }
}
