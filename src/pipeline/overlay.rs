//! Compositing generated layers onto existing PDF pages.
//!
//! A layer is drawn as its own single-page PDF, imported into the target
//! document as a Form XObject and painted on top of the page's existing
//! content:
//!
//! ```text
//! Contents = [ q ] + original streams + [ Q  q 1 0 0 1 llx lly cm /XoN Do Q ]
//! ```
//!
//! The original content is wrapped in `q … Q`; an unbalanced graphics state
//! in the source page cannot move or clip the layer.

use crate::error::Xml2PdfError;
use crate::pipeline::draw::{write_pdf, PageDrawing};
use crate::pipeline::fonts::FontSet;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use tracing::debug;

/// A4, used when a page has no readable MediaBox.
const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 595.28, 841.89];

/// Maximum `Parent` hops followed for inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Page ids in page order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// `[llx, lly, urx, ury]` of the page's MediaBox, following inheritance.
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve(doc, obj).as_array().ok().cloned())
        .and_then(|arr| {
            let nums: Vec<f32> = arr
                .iter()
                .filter_map(|o| resolve(doc, o).as_float().ok())
                .collect();
            (nums.len() == 4).then(|| {
                [
                    nums[0].min(nums[2]),
                    nums[1].min(nums[3]),
                    nums[0].max(nums[2]),
                    nums[1].max(nums[3]),
                ]
            })
        })
        .unwrap_or(DEFAULT_PAGE_BOX)
}

/// Look `key` up on the page, then on its ancestors.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Paint `layers` onto pages of `base`.
///
/// Each layer is a `(page_index, drawing)` pair; the drawing is in the
/// page's own coordinate system with the origin at the MediaBox corner.
/// All layers are generated into one PDF so fonts are embedded once.
///
/// Errors are reported through `fail`, so each caller can attribute them
/// to its own stage.
pub fn merge_layers(
    base: &[u8],
    layers: Vec<(usize, PageDrawing)>,
    fonts: &FontSet,
    fail: impl Fn(String) -> Xml2PdfError,
) -> Result<Vec<u8>, Xml2PdfError> {
    let mut doc = Document::load_mem(base).map_err(|e| fail(format!("cannot read PDF: {}", e)))?;
    let pages = page_ids(&doc);
    if layers.is_empty() {
        return Ok(base.to_vec());
    }

    let (targets, drawings): (Vec<usize>, Vec<PageDrawing>) = layers.into_iter().unzip();
    if let Some(&bad) = targets.iter().find(|&&i| i >= pages.len()) {
        return Err(fail(format!(
            "page {} out of range (document has {})",
            bad + 1,
            pages.len()
        )));
    }

    let layer_pdf = write_pdf("overlay", &drawings, fonts)?;
    let layer_doc =
        Document::load_mem(&layer_pdf).map_err(|e| fail(format!("cannot read layer: {}", e)))?;
    let layer_pages = page_ids(&layer_doc);

    let mut cache = HashMap::new();
    for (layer_page, &target) in layer_pages.iter().zip(&targets) {
        let page_id = pages[target];
        let [llx, lly, _, _] = page_box(&doc, page_id);
        let xobject = import_page_as_xobject(&mut doc, &layer_doc, *layer_page, &mut cache)
            .map_err(|e| fail(format!("cannot import layer: {}", e)))?;
        let name = register_xobject(&mut doc, page_id, xobject)
            .map_err(|e| fail(format!("cannot update page resources: {}", e)))?;
        let paint = format!("q 1 0 0 1 {} {} cm /{} Do Q\n", llx, lly, name);
        append_content(&mut doc, page_id, paint.as_bytes())
            .map_err(|e| fail(format!("cannot update page content: {}", e)))?;
        debug!("Layer painted on page {} as /{}", target + 1, name);
    }

    let mut out = Vec::with_capacity(base.len() + layer_pdf.len());
    doc.save_to(&mut out)
        .map_err(|e| fail(format!("cannot write PDF: {}", e)))?;
    Ok(out)
}

// ── XObject import ───────────────────────────────────────────────────────

/// Copy a page of `source` into `output` as a Form XObject.
pub fn import_page_as_xobject(
    output: &mut Document,
    source: &Document,
    page_id: ObjectId,
    cache: &mut HashMap<ObjectId, ObjectId>,
) -> lopdf::Result<ObjectId> {
    let media_box = page_box(source, page_id);
    let content = source.get_page_content(page_id)?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Form".to_vec()));
    dict.set("FormType", Object::Integer(1));
    dict.set(
        "BBox",
        Object::Array(media_box.iter().map(|v| Object::Real(*v)).collect()),
    );
    if let Some(resources) = inherited(source, page_id, b"Resources") {
        let resources = resources.clone();
        dict.set(
            "Resources",
            copy_object_deep(output, source, &resources, cache)?,
        );
    }
    Ok(output.add_object(Stream::new(dict, content)))
}

/// Deep-copy `obj` from `source` into `output`, following references.
/// `cache` maps source ids to already-copied ids.
pub fn copy_object_deep(
    output: &mut Document,
    source: &Document,
    obj: &Object,
    cache: &mut HashMap<ObjectId, ObjectId>,
) -> lopdf::Result<Object> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = cache.get(id) {
                return Ok(Object::Reference(new_id));
            }
            // Reserve the id first so cycles terminate.
            let new_id = output.new_object_id();
            cache.insert(*id, new_id);
            let copied = copy_object_deep(output, source, source.get_object(*id)?, cache)?;
            output.objects.insert(new_id, copied);
            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in dict.iter() {
                new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
            }
            Ok(Object::Dictionary(new_dict))
        }
        Object::Array(items) => items
            .iter()
            .map(|item| copy_object_deep(output, source, item, cache))
            .collect::<lopdf::Result<Vec<_>>>()
            .map(Object::Array),
        Object::Stream(stream) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in stream.dict.iter() {
                new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
            }
            let mut copy = Stream::new(new_dict, stream.content.clone());
            copy.allows_compression = stream.allows_compression;
            Ok(Object::Stream(copy))
        }
        _ => Ok(obj.clone()),
    }
}

// ── Page mutation ────────────────────────────────────────────────────────

enum ResourcesSlot {
    Shared(ObjectId),
    Inline,
    Missing(Dictionary),
}

/// The page's own Resources dictionary, materialising inherited or missing
/// resources on the page first.
fn resources_mut(doc: &mut Document, page_id: ObjectId) -> lopdf::Result<&mut Dictionary> {
    let slot = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => ResourcesSlot::Shared(*id),
            Ok(Object::Dictionary(_)) => ResourcesSlot::Inline,
            _ => ResourcesSlot::Missing(
                inherited(doc, page_id, b"Resources")
                    .and_then(|obj| resolve(doc, obj).as_dict().ok().cloned())
                    .unwrap_or_default(),
            ),
        }
    };
    match slot {
        ResourcesSlot::Shared(id) => doc.get_object_mut(id)?.as_dict_mut(),
        ResourcesSlot::Inline => doc
            .get_dictionary_mut(page_id)?
            .get_mut(b"Resources")?
            .as_dict_mut(),
        ResourcesSlot::Missing(dict) => {
            let page = doc.get_dictionary_mut(page_id)?;
            page.set("Resources", Object::Dictionary(dict));
            page.get_mut(b"Resources")?.as_dict_mut()
        }
    }
}

/// Add `xobject` to the page's `/XObject` resources under a fresh name.
pub fn register_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    xobject: ObjectId,
) -> lopdf::Result<String> {
    let shared = {
        let resources = resources_mut(doc, page_id)?;
        match resources.get(b"XObject") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                resources.set("XObject", Dictionary::new());
                None
            }
        }
    };
    let xobjects = match shared {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => resources_mut(doc, page_id)?
            .get_mut(b"XObject")?
            .as_dict_mut()?,
    };

    let mut n = 0usize;
    let name = loop {
        let candidate = format!("Xo{}", n);
        if !xobjects.has(candidate.as_bytes()) {
            break candidate;
        }
        n += 1;
    };
    xobjects.set(name.clone(), Object::Reference(xobject));
    Ok(name)
}

/// Append `ops` after the page's existing content, isolating that content
/// in its own graphics-state save/restore.
pub fn append_content(doc: &mut Document, page_id: ObjectId, ops: &[u8]) -> lopdf::Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut tail = b"\nQ\n".to_vec();
    tail.extend_from_slice(ops);
    let close = doc.add_object(Stream::new(Dictionary::new(), tail));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(existing);
    contents.push(Object::Reference(close));
    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::draw::DrawOp;
    use lopdf::content::{Content, Operation};
    use lopdf::dictionary;

    /// A minimal document with `pages` pages, each showing one line of text
    /// at y=700, resources and MediaBox inherited from the page tree.
    pub(crate) fn test_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids = Vec::new();
        for i in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn layer(text: &str) -> PageDrawing {
        let mut page = PageDrawing::new(595.0, 842.0);
        page.ops.push(DrawOp::Text {
            x: 10.0,
            y: 10.0,
            size: 9.0,
            bold: false,
            text: text.into(),
        });
        page
    }

    #[test]
    fn inherited_media_box_is_found() {
        let doc = Document::load_mem(&test_pdf(1)).unwrap();
        let page = page_ids(&doc)[0];
        assert_eq!(page_box(&doc, page), [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn merge_keeps_page_count_and_adds_xobject() {
        let base = test_pdf(3);
        let out = merge_layers(
            &base,
            vec![(2, layer("stamp"))],
            &FontSet::builtin(),
            |detail| Xml2PdfError::StampFailed { detail },
        )
        .unwrap();
        let doc = Document::load_mem(&out).unwrap();
        let pages = page_ids(&doc);
        assert_eq!(pages.len(), 3);

        let last = doc.get_dictionary(pages[2]).unwrap();
        let resources = last.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.has(b"Xo0"));
        // Inherited fonts are still reachable from the page.
        assert!(resources.has(b"Font"));

        let content = Content::decode(&doc.get_page_content(pages[2]).unwrap()).unwrap();
        let ops: Vec<&str> = content.operations.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(ops.first(), Some(&"q"));
        assert!(ops.contains(&"Do"));

        let first = doc.get_dictionary(pages[0]).unwrap();
        assert!(first.get(b"Resources").is_err(), "untouched page keeps inheritance");
    }

    #[test]
    fn two_layers_on_one_page_get_distinct_names() {
        let base = test_pdf(1);
        let fail = |detail| Xml2PdfError::StampFailed { detail };
        let once = merge_layers(&base, vec![(0, layer("a"))], &FontSet::builtin(), fail).unwrap();
        let twice = merge_layers(&once, vec![(0, layer("b"))], &FontSet::builtin(), fail).unwrap();
        let doc = Document::load_mem(&twice).unwrap();
        let page = doc.get_dictionary(page_ids(&doc)[0]).unwrap();
        let xobjects = page
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"XObject")
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(xobjects.has(b"Xo0") && xobjects.has(b"Xo1"));
    }

    #[test]
    fn out_of_range_page_is_error() {
        let err = merge_layers(
            &test_pdf(1),
            vec![(5, layer("x"))],
            &FontSet::builtin(),
            |detail| Xml2PdfError::PageNumberingFailed { detail },
        )
        .unwrap_err();
        assert!(matches!(err, Xml2PdfError::PageNumberingFailed { .. }));
    }

    #[test]
    fn garbage_input_is_error() {
        let err = merge_layers(
            b"not a pdf",
            vec![(0, layer("x"))],
            &FontSet::builtin(),
            |detail| Xml2PdfError::StampFailed { detail },
        )
        .unwrap_err();
        assert!(matches!(err, Xml2PdfError::StampFailed { .. }));
    }
}
