//! Redaction applicator: accumulates regions per page and commits them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::geometry::{Color, Quad};
use crate::resolver::Region;

/// One pending coverage request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionMark {
    pub quad: Quad,
    pub fill: Color,
}

/// Regions awaiting commit on one page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RedactionRequest {
    page: usize,
    marks: Vec<RedactionMark>,
}

impl RedactionRequest {
    pub fn new(page: usize) -> Self {
        Self {
            page,
            marks: Vec::new(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn marks(&self) -> &[RedactionMark] {
        &self.marks
    }

    pub fn push(&mut self, quad: Quad, fill: Color) {
        self.marks.push(RedactionMark { quad, fill });
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// Holds pending redactions until their page is committed.
#[derive(Debug, Default)]
pub struct RedactionApplicator {
    pending: BTreeMap<usize, RedactionRequest>,
}

impl RedactionApplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register opaque coverage of `region` on its page.
    ///
    /// Nothing on the page changes until [`commit`](Self::commit). Marking
    /// the same area twice is harmless.
    pub fn mark(&mut self, region: Region, fill: Color) {
        self.pending
            .entry(region.page)
            .or_insert_with(|| RedactionRequest::new(region.page))
            .push(region.quad, fill);
    }

    pub fn pending(&self, page: usize) -> Option<&RedactionRequest> {
        self.pending.get(&page)
    }

    pub fn pending_pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pending.keys().copied()
    }

    /// Turn every pending mark of `page` into permanent removal and clear
    /// the page's pending set. Returns the number of glyphs removed.
    ///
    /// On failure nothing on the page is committed and the marks stay
    /// pending.
    pub fn commit<D: Document>(&mut self, doc: &mut D, page: usize) -> Result<usize, D::Error> {
        let Some(request) = self.pending.remove(&page) else {
            log::debug!("[Redact] page {}: nothing to commit", page + 1);
            return Ok(0);
        };
        if request.is_empty() {
            return Ok(0);
        }

        match doc.apply_redactions(page, &request) {
            Ok(removed) => {
                log::info!(
                    "[Redact] page {}: committed {} regions, {} glyphs removed",
                    page + 1,
                    request.len(),
                    removed
                );
                Ok(removed)
            }
            Err(e) => {
                self.pending.insert(page, request);
                Err(e)
            }
        }
    }
}
