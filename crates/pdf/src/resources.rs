//! Resource lookup for content streams: fonts and form XObjects.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::font::{load_fonts, FontMap};
use crate::utils::{get_matrix, get_page_resources, get_stream_content, resolve_array, resolve_dict, Matrix};

/// Resources visible to one content stream.
///
/// The default set has no document and resolves nothing. A structural set
/// resolves XObjects but loads no fonts, here or in the forms it yields.
#[derive(Debug, Default)]
pub struct Resources<'d> {
    doc: Option<&'d Document>,
    dict: Option<&'d Dictionary>,
    with_fonts: bool,
    pub fonts: FontMap,
}

/// A form XObject ready to be interpreted.
#[derive(Debug)]
pub struct Form<'d> {
    pub id: ObjectId,
    /// Form space to user space at the point of invocation
    pub matrix: Matrix,
    /// The form stream's dictionary
    pub dict: &'d Dictionary,
    pub operations: Vec<Operation>,
    pub resources: Resources<'d>,
}

impl<'d> Resources<'d> {
    pub fn new(doc: &'d Document, dict: Option<&'d Dictionary>) -> Self {
        Self {
            doc: Some(doc),
            dict,
            with_fonts: true,
            fonts: load_fonts(doc, dict),
        }
    }

    /// Resources of a page, inherited if needed.
    pub fn page(doc: &'d Document, page_id: ObjectId) -> Self {
        Self::new(doc, get_page_resources(doc, page_id))
    }

    /// Page resources for walking the XObject graph only.
    pub fn structure(doc: &'d Document, page_id: ObjectId) -> Self {
        Self {
            doc: Some(doc),
            dict: get_page_resources(doc, page_id),
            with_fonts: false,
            fonts: FontMap::new(),
        }
    }

    pub fn dict(&self) -> Option<&'d Dictionary> {
        self.dict
    }

    fn xobjects(&self) -> Option<&'d Dictionary> {
        let doc = self.doc?;
        self.dict?
            .get(b"XObject")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
    }

    pub fn has_xobjects(&self) -> bool {
        self.xobjects().is_some_and(|x| !x.is_empty())
    }

    pub fn has_xobject(&self, name: &[u8]) -> bool {
        self.xobjects().is_some_and(|x| x.has(name))
    }

    /// The form XObject registered under `name`. Image XObjects and
    /// unreadable forms yield `None`.
    pub fn form(&self, name: &[u8]) -> Option<Form<'d>> {
        let doc = self.doc?;
        let id = self.xobjects()?.get(name).ok()?.as_reference().ok()?;
        let stream = doc.get_object(id).ok()?.as_stream().ok()?;
        match stream.dict.get(b"Subtype") {
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Form" => {}
            _ => return None,
        }

        let operations = match Content::decode(&get_stream_content(stream)) {
            Ok(content) => content.operations,
            Err(e) => {
                log::warn!("[XObject] form {:?} has unreadable content: {}", id, e);
                return None;
            }
        };
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| resolve_array(doc, obj))
            .and_then(|arr| get_matrix(arr))
            .unwrap_or(Matrix::IDENTITY);
        // forms without their own resources use the invoking stream's
        let dict = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
            .or(self.dict);

        let resources = if self.with_fonts {
            Resources::new(doc, dict)
        } else {
            Resources {
                doc: Some(doc),
                dict,
                with_fonts: false,
                fonts: FontMap::new(),
            }
        };
        Some(Form {
            id,
            matrix,
            dict: &stream.dict,
            operations,
            resources,
        })
    }
}
