//! Redaction commit: glyph removal, opaque overlay, annotation cleanup.
//!
//! Form XObjects showing covered text are never edited in place, since
//! other pages may share them. Each affected invocation gets a rewritten
//! copy registered under a fresh name, and the originals are dropped once
//! no page invokes them any more.

use std::collections::{HashMap, HashSet};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdfscrub_core::{Quad, RedactionMark, RedactionRequest};

use crate::content::{interpret, Glyph, ShowText, MAX_FORM_DEPTH};
use crate::resources::Resources;
use crate::utils::{get_media_box, get_page_content, get_rect, resolve_array, resolve_dict};
use crate::PdfError;

/// Outcome of rewriting one page's content.
#[derive(Debug)]
pub struct Rewrite {
    pub content: Vec<u8>,
    pub glyphs_removed: usize,
    /// Copies of the forms that showed covered text
    pub forms: Vec<FormRewrite>,
}

/// A rewritten copy of one form XObject invocation.
#[derive(Debug)]
pub struct FormRewrite {
    /// Name the copy is registered under in the invoking resources
    pub name: Vec<u8>,
    /// The form being replaced
    pub original: ObjectId,
    /// Stream dictionary of the copy, without filters
    pub dict: Dictionary,
    /// Effective resources of the form
    pub resources: Dictionary,
    pub content: Vec<u8>,
    /// Copies of forms invoked from this one
    pub forms: Vec<FormRewrite>,
}

/// Reject a request containing any region that cannot be drawn.
pub fn validate(request: &RedactionRequest) -> Result<(), PdfError> {
    for (i, mark) in request.marks().iter().enumerate() {
        if !mark.quad.is_valid() {
            return Err(PdfError::InvalidRegion(format!(
                "region {} on page {} is degenerate: {}",
                i,
                request.page() + 1,
                mark.quad
            )));
        }
        if !mark.fill.is_valid() {
            return Err(PdfError::InvalidRegion(format!(
                "region {} on page {} has an invalid fill color",
                i,
                request.page() + 1
            )));
        }
    }
    Ok(())
}

fn covered(glyph: &Glyph, marks: &[RedactionMark]) -> bool {
    let center = glyph.quad.center();
    marks.iter().any(|m| m.quad.contains(center))
}

/// `TJ` adjustment replacing a removed glyph so the text after it keeps
/// its position.
fn removal_adjustment(glyph: &Glyph, show: &ShowText) -> f32 {
    let size = show.state.size;
    if size.abs() <= f32::EPSILON {
        return -glyph.width;
    }
    -(glyph.width + glyph.spacing * 1000.0 / size)
}

/// Rebuild the operand of a show operator without the covered glyphs.
///
/// `items` are the original `TJ` array elements (or the single string of
/// `Tj`). Returns `None` when no glyph of the operator is covered.
fn rebuild_array(
    items: &[Object],
    show: &ShowText,
    marks: &[RedactionMark],
    removed: &mut usize,
) -> Option<Vec<Object>> {
    if !show.glyphs.iter().any(|g| covered(g, marks)) {
        return None;
    }

    let mut out = Vec::with_capacity(items.len());
    let mut glyphs = show.glyphs.iter().peekable();

    for (element, item) in items.iter().enumerate() {
        let Object::String(_, format) = item else {
            out.push(item.clone());
            continue;
        };

        let mut kept: Vec<u8> = Vec::new();
        while let Some(glyph) = glyphs.next_if(|g| g.element == element) {
            if covered(glyph, marks) {
                if !kept.is_empty() {
                    out.push(Object::String(std::mem::take(&mut kept), *format));
                }
                let n = removal_adjustment(glyph, show);
                // merge with a preceding adjustment
                match out.last_mut() {
                    Some(Object::Real(prev)) => *prev += n,
                    _ => out.push(Object::Real(n)),
                }
                *removed += 1;
                log::trace!("[Redact] removed glyph {:?}", glyph.text);
            } else {
                kept.extend_from_slice(&glyph.bytes);
            }
        }
        if !kept.is_empty() {
            out.push(Object::String(kept, *format));
        }
    }

    Some(out)
}

/// Rewrite the decoded operations, dropping covered glyphs. `Do`
/// operators listed in `renamed` are pointed at the given XObject.
fn remove_glyphs(
    operations: Vec<Operation>,
    shown: &[&ShowText],
    renamed: &HashMap<usize, Vec<u8>>,
    marks: &[RedactionMark],
) -> (Vec<Operation>, usize) {
    let mut removed = 0;
    let mut by_index = shown.iter().peekable();
    let mut out = Vec::with_capacity(operations.len());

    for (index, op) in operations.into_iter().enumerate() {
        if let Some(name) = renamed.get(&index) {
            out.push(Operation::new("Do", vec![Object::Name(name.clone())]));
            continue;
        }
        let Some(show) = by_index.next_if(|s| s.op_index == index) else {
            out.push(op);
            continue;
        };

        match op.operator.as_str() {
            "TJ" => {
                let items = match op.operands.first() {
                    Some(Object::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                match rebuild_array(&items, show, marks, &mut removed) {
                    Some(array) => out.push(Operation::new("TJ", vec![Object::Array(array)])),
                    None => out.push(op),
                }
            }
            "Tj" | "'" | "\"" => {
                let string_at = if op.operator == "\"" { 2 } else { 0 };
                let items: Vec<Object> = op.operands.get(string_at).cloned().into_iter().collect();
                let Some(array) = rebuild_array(&items, show, marks, &mut removed) else {
                    out.push(op);
                    continue;
                };
                match op.operator.as_str() {
                    "'" => out.push(Operation::new("T*", vec![])),
                    "\"" => {
                        out.push(Operation::new("Tw", vec![op.operands[0].clone()]));
                        out.push(Operation::new("Tc", vec![op.operands[1].clone()]));
                        out.push(Operation::new("T*", vec![]));
                    }
                    _ => {}
                }
                out.push(Operation::new("TJ", vec![Object::Array(array)]));
            }
            _ => out.push(op),
        }
    }

    (out, removed)
}

fn overlay(marks: &[RedactionMark]) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(marks.len() * 8 + 2);
    ops.push(Operation::new("q", vec![]));
    for mark in marks {
        let Quad { ll, lr, ur, ul } = mark.quad;
        ops.push(Operation::new(
            "rg",
            vec![
                Object::Real(mark.fill.r),
                Object::Real(mark.fill.g),
                Object::Real(mark.fill.b),
            ],
        ));
        ops.push(Operation::new("m", vec![Object::Real(ll.x), Object::Real(ll.y)]));
        ops.push(Operation::new("l", vec![Object::Real(lr.x), Object::Real(lr.y)]));
        ops.push(Operation::new("l", vec![Object::Real(ur.x), Object::Real(ur.y)]));
        ops.push(Operation::new("l", vec![Object::Real(ul.x), Object::Real(ul.y)]));
        ops.push(Operation::new("h", vec![]));
        ops.push(Operation::new("f", vec![]));
    }
    ops.push(Operation::new("Q", vec![]));
    ops
}

/// XObject name derived from `base` that is unused in `resources`.
fn fresh_name(resources: &Resources<'_>, base: &[u8], taken: &[Vec<u8>]) -> Vec<u8> {
    let mut n = 1;
    loop {
        let mut name = base.to_vec();
        name.extend_from_slice(format!("_R{}", n).as_bytes());
        if !resources.has_xobject(&name) && !taken.contains(&name) {
            return name;
        }
        n += 1;
    }
}

/// Remove covered glyphs from one stream and from the forms it invokes.
///
/// `shown` is the walk of this stream, form text included.
fn rewrite_stream(
    operations: Vec<Operation>,
    shown: &[ShowText],
    resources: &Resources<'_>,
    marks: &[RedactionMark],
) -> Result<(Vec<Operation>, usize, Vec<FormRewrite>), PdfError> {
    let mut removed = 0;
    let mut forms = Vec::new();
    let mut renamed = HashMap::new();
    let mut taken = Vec::new();

    for (index, op) in operations.iter().enumerate() {
        if op.operator != "Do" {
            continue;
        }
        let inner: Vec<ShowText> = shown
            .iter()
            .filter(|s| s.forms.first() == Some(&index))
            .map(|s| ShowText {
                forms: s.forms[1..].to_vec(),
                ..s.clone()
            })
            .collect();
        if !inner.iter().flat_map(|s| &s.glyphs).any(|g| covered(g, marks)) {
            continue;
        }
        let Some(Object::Name(name)) = op.operands.first() else {
            continue;
        };
        let Some(form) = resources.form(name) else {
            continue;
        };

        let (form_ops, form_removed, nested) =
            rewrite_stream(form.operations, &inner, &form.resources, marks)?;
        let copy = fresh_name(resources, name, &taken);
        taken.push(copy.clone());

        let mut dict = form.dict.clone();
        for key in [&b"Filter"[..], &b"DecodeParms"[..], &b"Length"[..]] {
            dict.remove(key);
        }
        log::debug!(
            "[Redact] form /{} rewritten as /{}, {} glyphs removed",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(&copy),
            form_removed
        );
        forms.push(FormRewrite {
            name: copy.clone(),
            original: form.id,
            dict,
            resources: form.resources.dict().cloned().unwrap_or_default(),
            content: Content {
                operations: form_ops,
            }
            .encode()?,
            forms: nested,
        });
        renamed.insert(index, copy);
        removed += form_removed;
    }

    let local: Vec<&ShowText> = shown.iter().filter(|s| s.forms.is_empty()).collect();
    let (operations, local_removed) = remove_glyphs(operations, &local, &renamed, marks);
    Ok((operations, removed + local_removed, forms))
}

/// Produce the new content stream for a page: original content without the
/// covered glyphs, isolated in `q ... Q`, followed by the fills.
pub fn rewrite_content(
    content_data: &[u8],
    resources: &Resources<'_>,
    marks: &[RedactionMark],
) -> Result<Rewrite, PdfError> {
    let content = Content::decode(content_data)?;
    let shown = interpret(&content.operations, resources);
    let (operations, glyphs_removed, forms) =
        rewrite_stream(content.operations, &shown, resources, marks)?;

    let mut wrapped = Vec::with_capacity(operations.len() + marks.len() * 8 + 4);
    wrapped.push(Operation::new("q", vec![]));
    wrapped.extend(operations);
    wrapped.push(Operation::new("Q", vec![]));
    wrapped.extend(overlay(marks));

    let content = Content {
        operations: wrapped,
    }
    .encode()?;
    Ok(Rewrite {
        content,
        glyphs_removed,
        forms,
    })
}

// ============ Commit bookkeeping ============

/// `resources` with `entries` added to its XObject dictionary.
pub fn with_xobjects(
    doc: &Document,
    mut resources: Dictionary,
    entries: &[(Vec<u8>, ObjectId)],
) -> Dictionary {
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .cloned()
        .unwrap_or_default();
    for (name, id) in entries {
        xobjects.set(name.clone(), Object::Reference(*id));
    }
    resources.set("XObject", Object::Dictionary(xobjects));
    resources
}

/// Add the rewritten forms as new objects and return the XObject entries
/// the invoking resources must register. Replaced form ids are appended
/// to `originals`, outermost first.
pub fn install_forms(
    doc: &mut Document,
    forms: Vec<FormRewrite>,
    originals: &mut Vec<ObjectId>,
) -> Vec<(Vec<u8>, ObjectId)> {
    let mut entries = Vec::with_capacity(forms.len());
    for form in forms {
        originals.push(form.original);
        let mut dict = form.dict;
        let nested = install_forms(doc, form.forms, originals);
        if !nested.is_empty() {
            dict.set("Resources", with_xobjects(doc, form.resources, &nested));
        }
        let id = doc.add_object(Stream::new(dict, form.content));
        entries.push((form.name, id));
    }
    entries
}

/// Object ids holding the page's content: the `/Contents` array object if
/// it is indirect, then every referenced stream.
pub fn content_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Some(contents) = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Contents").ok())
    else {
        return Vec::new();
    };

    let mut ids = Vec::new();
    if let Object::Reference(id) = contents {
        ids.push(*id);
    }
    if let Some(arr) = resolve_array(doc, contents) {
        ids.extend(arr.iter().filter_map(|o| o.as_reference().ok()));
    }
    ids
}

fn refers_to(obj: &Object, id: ObjectId) -> bool {
    match obj {
        Object::Reference(r) => *r == id,
        Object::Array(items) => items.iter().any(|o| refers_to(o, id)),
        Object::Dictionary(dict) => dict.iter().any(|(_, o)| refers_to(o, id)),
        Object::Stream(stream) => stream.dict.iter().any(|(_, o)| refers_to(o, id)),
        _ => false,
    }
}

fn is_referenced(doc: &Document, id: ObjectId) -> bool {
    doc.trailer.iter().any(|(_, o)| refers_to(o, id))
        || doc
            .objects
            .iter()
            .any(|(other, o)| *other != id && refers_to(o, id))
}

/// Delete the objects in `ids` that nothing refers to any more, in order.
/// Returns how many were deleted.
pub fn drop_unreferenced(doc: &mut Document, ids: &[ObjectId]) -> usize {
    let mut dropped = 0;
    for id in ids {
        if !is_referenced(doc, *id) && doc.objects.remove(id).is_some() {
            log::debug!("[Redact] dropped replaced object {:?}", id);
            dropped += 1;
        }
    }
    dropped
}

fn collect_invoked(
    operations: &[Operation],
    resources: &Resources<'_>,
    depth: usize,
    invoked: &mut HashSet<ObjectId>,
) {
    for op in operations.iter().filter(|op| op.operator == "Do") {
        let Some(Object::Name(name)) = op.operands.first() else {
            continue;
        };
        let Some(form) = resources.form(name) else {
            continue;
        };
        if invoked.insert(form.id) && depth < MAX_FORM_DEPTH {
            collect_invoked(&form.operations, &form.resources, depth + 1, invoked);
        }
    }
}

/// Every form XObject some page invokes, directly or through other forms.
fn invoked_forms(doc: &Document) -> HashSet<ObjectId> {
    let mut invoked = HashSet::new();
    for page_id in doc.page_iter() {
        let resources = Resources::structure(doc, page_id);
        if !resources.has_xobjects() {
            continue;
        }
        let operations = get_page_content(doc, page_id)
            .ok()
            .and_then(|data| Content::decode(&data).ok())
            .map(|content| content.operations)
            .unwrap_or_default();
        collect_invoked(&operations, &resources, 0, &mut invoked);
    }
    invoked
}

fn strip_dict(dict: &mut Dictionary, id: ObjectId) {
    let stale: Vec<Vec<u8>> = dict
        .iter()
        .filter(|(_, o)| matches!(o, Object::Reference(r) if *r == id))
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        dict.remove(&key);
    }
    for (_, o) in dict.iter_mut() {
        strip_references(o, id);
    }
}

fn strip_references(obj: &mut Object, id: ObjectId) {
    match obj {
        Object::Dictionary(dict) => strip_dict(dict, id),
        Object::Stream(stream) => strip_dict(&mut stream.dict, id),
        Object::Array(items) => items.iter_mut().for_each(|o| strip_references(o, id)),
        _ => {}
    }
}

/// Delete replaced forms that no page invokes any more, together with the
/// resource entries naming them. Returns how many were deleted.
pub fn drop_unused_forms(doc: &mut Document, originals: &[ObjectId]) -> usize {
    if originals.is_empty() {
        return 0;
    }
    let invoked = invoked_forms(doc);
    let mut dropped = 0;
    for id in originals {
        if invoked.contains(id) || doc.objects.remove(id).is_none() {
            continue;
        }
        for obj in doc.objects.values_mut() {
            strip_references(obj, *id);
        }
        log::debug!("[Redact] dropped replaced form {:?}", id);
        dropped += 1;
    }
    dropped
}

/// Warn about regions lying entirely off the page.
pub fn check_page_bounds(doc: &Document, page_id: ObjectId, request: &RedactionRequest) {
    let media_box = get_media_box(doc, page_id);
    for mark in request.marks() {
        if !mark.quad.bounding_rect().intersects(&media_box) {
            log::warn!(
                "[Redact] page {}: region {} lies outside the page",
                request.page() + 1,
                mark.quad
            );
        }
    }
}

// ============ Annotations ============

/// Annotation IDs of a page.
fn get_annot_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|annots| resolve_array(doc, annots))
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_reference().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Annotations whose `/Rect` intersects any mark.
pub fn intersecting_annotations(
    doc: &Document,
    page_id: ObjectId,
    marks: &[RedactionMark],
) -> Vec<ObjectId> {
    get_annot_ids(doc, page_id)
        .into_iter()
        .filter(|id| {
            doc.get_dictionary(*id)
                .ok()
                .and_then(|annot| get_rect(doc, annot, b"Rect"))
                .is_some_and(|rect| marks.iter().any(|m| m.quad.bounding_rect().intersects(&rect)))
        })
        .collect()
}

/// Drop `removed` annotations from the document and the page's `/Annots`.
pub fn remove_annotations(doc: &mut Document, page_id: ObjectId, removed: &[ObjectId]) {
    if removed.is_empty() {
        return;
    }

    for annot_id in removed {
        let subtype = doc
            .get_dictionary(*annot_id)
            .ok()
            .and_then(|d| d.get(b"Subtype").ok())
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|| "Unknown".to_string());
        doc.objects.remove(annot_id);
        log::info!("[Redact] removed {} annotation {:?}", subtype, annot_id);
    }

    // the array may live inline or in its own object
    let annots_ref = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|o| o.as_reference().ok());
    let remaining: Vec<Object> = get_annot_ids(doc, page_id)
        .into_iter()
        .filter(|id| !removed.contains(id))
        .map(Object::Reference)
        .collect();

    if let Some(array_id) = annots_ref {
        doc.objects.remove(&array_id);
    }
    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        if remaining.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", Object::Array(remaining));
        }
    }
}
