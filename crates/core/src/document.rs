//! Document engine interface.
//!
//! The pipeline never touches a file format directly. Every engine (the
//! `lopdf` backed one in `pdfscrub-pdf`, the in-memory fake used by tests)
//! implements `Document`, which keeps the pipeline identical across them.

use crate::applicator::RedactionRequest;
use crate::geometry::Quad;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One run of extracted text.
///
/// A run is a stretch of characters the engine shows with the same font on
/// the same baseline. It is not guaranteed to line up with words or
/// sentences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Decoded text of the run
    pub text: String,
    /// Text block the run belongs to (one per `BT`/`ET` object in PDF)
    pub block: usize,
    /// Line within the page, counted across blocks
    pub line: usize,
    /// One quad per character of `text`, when the engine exposes glyph
    /// geometry; empty otherwise.
    #[serde(default)]
    pub glyphs: Vec<Quad>,
}

impl TextRun {
    /// A run without glyph geometry.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            block: 0,
            line: 0,
            glyphs: Vec::new(),
        }
    }

    /// True when `glyphs` lines up one-to-one with the characters of `text`.
    pub fn has_glyph_geometry(&self) -> bool {
        !self.glyphs.is_empty() && self.glyphs.len() == self.text.chars().count()
    }
}

/// Options for persisting a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Drop unreachable objects and renumber what remains
    pub garbage: bool,
    /// Compress streams
    pub deflate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            garbage: true,
            deflate: true,
        }
    }
}

/// Document engine interface.
///
/// Page indices are 0-based. Engines report their own error type; the
/// pipeline maps it onto the failure taxonomy in [`crate::CoreError`].
pub trait Document: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a document from disk.
    fn open(path: &Path) -> Result<Self, Self::Error>;

    /// Number of pages, in document order.
    fn page_count(&self) -> usize;

    /// Structured text of a page: runs in reading order, grouped by block
    /// and line.
    fn extract_runs(&self, page: usize) -> Result<Vec<TextRun>, Self::Error>;

    /// Every visual occurrence of `needle` on the page, one quad each.
    ///
    /// Text that cannot be located yields an empty result, not an error.
    fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Quad>, Self::Error>;

    /// Irreversibly remove the content under every region of `request` and
    /// paint the regions with the request's fill color.
    ///
    /// Either all regions are applied or the page is left untouched and an
    /// error is returned. Returns the number of glyphs removed.
    fn apply_redactions(
        &mut self,
        page: usize,
        request: &RedactionRequest,
    ) -> Result<usize, Self::Error>;

    /// Persist the document.
    fn save(&mut self, path: &Path, options: &SaveOptions) -> Result<(), Self::Error>;

    /// Release the document. Engines that hold no external resources can
    /// rely on the default.
    fn close(self) {}
}
