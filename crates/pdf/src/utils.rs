use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdfscrub_core::{Point, Rect};

use crate::PdfError;

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [f32; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self x other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = other.0;
        Matrix([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> Point {
        let [a, b, c, d, e, f] = self.0;
        Point::new(a * x + c * y + e, b * x + d * y + f)
    }

    /// Length of the vector `(0, len)` after transformation.
    pub fn vertical_scale(&self, len: f32) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * len).hypot(d * len)
    }
}

/// Numeric value of an integer or real object.
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Six numeric operands as a matrix.
pub fn get_matrix(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = get_number(obj)?;
    }
    Some(Matrix(m))
}

/// Follow a reference, or return the object itself.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    match resolve(doc, obj)? {
        Object::Array(arr) => Some(arr),
        _ => None,
    }
}

/// Page attribute, inherited through the `/Parent` chain when the page
/// itself does not carry it.
pub fn get_inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // bounded walk, malformed files can contain parent cycles
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn extract_box_values(arr: &[Object]) -> Option<Rect> {
    let values: Vec<f32> = arr.iter().filter_map(get_number).collect();
    if values.len() == 4 {
        Some(Rect::from_corners(values[0], values[1], values[2], values[3]))
    } else {
        None
    }
}

/// The page's MediaBox, inherited if needed, defaulting to US Letter.
pub fn get_media_box(doc: &Document, page_id: ObjectId) -> Rect {
    get_inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve_array(doc, obj))
        .and_then(|arr| extract_box_values(arr))
        .unwrap_or_else(|| {
            log::warn!("[MediaBox] no usable MediaBox, assuming Letter");
            Rect::from_corners(0.0, 0.0, 612.0, 792.0)
        })
}

/// Rect of an annotation or similar dictionary entry.
pub fn get_rect(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Rect> {
    let arr = resolve_array(doc, dict.get(key).ok()?)?;
    extract_box_values(arr)
}

/// Stream data, decompressed when the filter is supported.
pub fn get_stream_content(stream: &Stream) -> Vec<u8> {
    match stream.decompressed_content() {
        Ok(data) => data,
        Err(_) => stream.content.clone(),
    }
}

/// The page's content stream data.
///
/// Multiple content streams are joined with a newline.
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, PdfError> {
    let page = doc.get_dictionary(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents) {
        Some(Object::Stream(stream)) => Ok(get_stream_content(stream)),
        Some(Object::Array(arr)) => {
            let mut all_content = Vec::new();
            for item in arr {
                if let Some(Object::Stream(stream)) = resolve(doc, item) {
                    all_content.extend(get_stream_content(stream));
                    all_content.push(b'\n');
                }
            }
            Ok(all_content)
        }
        _ => Err(PdfError::Malformed(format!(
            "page {:?} has unreadable /Contents",
            page_id
        ))),
    }
}

/// The page's resource dictionary, inherited if needed.
pub fn get_page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    get_inherited(doc, page_id, b"Resources").and_then(|obj| resolve_dict(doc, obj))
}
