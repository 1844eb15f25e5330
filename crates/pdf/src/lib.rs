//! `lopdf` backed document engine.

pub mod content;
pub mod extract;
pub mod font;
pub mod redact;
pub mod resources;
pub mod utils;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lopdf::content::Content;
use lopdf::{ObjectId, Stream};
use pdfscrub_core::{Document, Quad, RedactionRequest, SaveOptions, TextRun};

use crate::content::{interpret, ShowText};
use crate::extract::{build_lines, build_runs, search_lines, Line};
use crate::resources::Resources;
use crate::utils::{get_page_content, get_page_resources};

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("pdf error: {0}")]
    Lopdf(#[from] lopdf::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("page {0} does not exist")]
    NoSuchPage(usize),
    #[error("invalid redaction region: {0}")]
    InvalidRegion(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;

/// A PDF opened for redaction.
#[derive(Debug)]
pub struct PdfDocument {
    doc: lopdf::Document,
    pages: Vec<ObjectId>,
    source: Option<PathBuf>,
}

impl PdfDocument {
    pub fn from_lopdf(doc: lopdf::Document) -> Self {
        let pages = doc.page_iter().collect();
        Self {
            doc,
            pages,
            source: None,
        }
    }

    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_lopdf(lopdf::Document::load_mem(bytes)?))
    }

    pub fn inner(&self) -> &lopdf::Document {
        &self.doc
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.pages.get(page).copied().ok_or(PdfError::NoSuchPage(page))
    }

    fn interpret_page(&self, page: usize) -> Result<Vec<ShowText>> {
        let page_id = self.page_id(page)?;
        let data = get_page_content(&self.doc, page_id)?;
        let content = Content::decode(&data)?;
        let resources = Resources::page(&self.doc, page_id);
        Ok(interpret(&content.operations, &resources))
    }

    fn lines(&self, page: usize) -> Result<Vec<Line>> {
        Ok(build_lines(&self.extract_runs(page)?))
    }

    /// Page text, one line per text line.
    pub fn page_text(&self, page: usize) -> Result<String> {
        let lines = self.lines(page)?;
        Ok(lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn write_to(&mut self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.doc.save_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl Document for PdfDocument {
    type Error = PdfError;

    fn open(path: &Path) -> Result<Self> {
        let doc = lopdf::Document::load(path)?;
        if doc.is_encrypted() {
            log::warn!("[Open] {} is encrypted, text may not be readable", path.display());
        }
        let mut opened = Self::from_lopdf(doc);
        opened.source = Some(path.to_path_buf());
        log::debug!("[Open] {} pages in {}", opened.pages.len(), path.display());
        Ok(opened)
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn extract_runs(&self, page: usize) -> Result<Vec<TextRun>> {
        let runs = build_runs(&self.interpret_page(page)?);
        log::debug!("[Extract] page {}: {} runs", page + 1, runs.len());
        Ok(runs)
    }

    fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Quad>> {
        Ok(search_lines(&self.lines(page)?, needle))
    }

    fn apply_redactions(&mut self, page: usize, request: &RedactionRequest) -> Result<usize> {
        let page_id = self.page_id(page)?;
        redact::validate(request)?;
        redact::check_page_bounds(&self.doc, page_id, request);

        let data = get_page_content(&self.doc, page_id)?;
        let rewrite = {
            let resources = Resources::page(&self.doc, page_id);
            redact::rewrite_content(&data, &resources, request.marks())?
        };
        let annots = redact::intersecting_annotations(&self.doc, page_id, request.marks());
        let old_contents = redact::content_ids(&self.doc, page_id);
        let page_resources = get_page_resources(&self.doc, page_id).cloned();

        // nothing above touched the document
        let mut replaced_forms = Vec::new();
        let entries = redact::install_forms(&mut self.doc, rewrite.forms, &mut replaced_forms);
        let resources = (!entries.is_empty()).then(|| {
            redact::with_xobjects(&self.doc, page_resources.unwrap_or_default(), &entries)
        });
        let stream_id = self
            .doc
            .add_object(Stream::new(lopdf::Dictionary::new(), rewrite.content));

        let page_dict = self.doc.get_dictionary_mut(page_id)?;
        page_dict.set("Contents", lopdf::Object::Reference(stream_id));
        if let Some(resources) = resources {
            page_dict.set("Resources", resources);
        }
        redact::remove_annotations(&mut self.doc, page_id, &annots);

        // the unredacted streams must not survive in the object table
        let dropped = redact::drop_unreferenced(&mut self.doc, &old_contents)
            + redact::drop_unused_forms(&mut self.doc, &replaced_forms);

        log::info!(
            "[Redact] page {}: {} regions filled, {} glyphs removed, {} annotations removed, {} objects dropped",
            page + 1,
            request.len(),
            rewrite.glyphs_removed,
            annots.len(),
            dropped
        );
        Ok(rewrite.glyphs_removed)
    }

    fn save(&mut self, path: &Path, options: &SaveOptions) -> Result<()> {
        if options.garbage {
            let pruned = self.doc.prune_objects();
            let empty = self.doc.delete_zero_length_streams();
            self.doc.renumber_objects();
            log::debug!(
                "[Save] pruned {} objects, {} empty streams",
                pruned.len(),
                empty.len()
            );
        }
        if options.deflate {
            self.doc.compress();
        }

        if let Err(e) = self.write_to(path) {
            if path.exists() {
                if let Err(rm) = fs::remove_file(path) {
                    log::warn!("[Save] could not remove partial {}: {}", path.display(), rm);
                }
            }
            return Err(e);
        }
        // page ids change when objects are renumbered
        self.pages = self.doc.page_iter().collect();
        log::info!("[Save] wrote {}", path.display());
        Ok(())
    }

    fn close(self) {
        log::debug!(
            "[Close] {}",
            self.source
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<memory>".to_string())
        );
    }
}
