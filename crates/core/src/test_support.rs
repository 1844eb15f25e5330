//! In-memory document used by the unit tests.
//!
//! Every line is one run. Character `i` of line `l` occupies a 10x12 box at
//! `x = 10 * i`, `y = 700 - 20 * l`. Committed characters become spaces.
//!
//! On disk a document is plain text with pages separated by form feeds.

use std::cell::Cell;
use std::fs;
use std::path::Path;

use crate::applicator::RedactionRequest;
use crate::document::{Document, SaveOptions, TextRun};
use crate::geometry::{Quad, Rect};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not a text document")]
    NotText,
    #[error("page {0} out of range")]
    NoSuchPage(usize),
    #[error("injected failure: {0}")]
    Injected(&'static str),
    #[error("invalid region geometry")]
    InvalidRegion,
}

#[derive(Debug)]
pub struct MemoryDocument {
    pages: Vec<Vec<Vec<Option<char>>>>,
    search_calls: Cell<usize>,
    commits: Vec<(usize, usize)>,
    pub fail_extract_on: Option<usize>,
}

impl MemoryDocument {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|lines| lines.into_iter().map(|l| l.chars().map(Some).collect()).collect())
                .collect(),
            search_calls: Cell::new(0),
            commits: Vec::new(),
            fail_extract_on: None,
        }
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.get()
    }

    /// `(page, marks)` for every commit that reached the engine.
    pub fn commits(&self) -> Vec<(usize, usize)> {
        self.commits.clone()
    }

    pub fn line_text(&self, page: usize, line: usize) -> String {
        self.pages[page][line]
            .iter()
            .map(|c| c.unwrap_or(' '))
            .collect()
    }

    fn glyph(line: usize, index: usize) -> Quad {
        let x = index as f32 * 10.0;
        let y = 700.0 - 20.0 * line as f32;
        Quad::from_rect(Rect::from_corners(x, y, x + 10.0, y + 12.0))
    }

    fn page(&self, page: usize) -> Result<&Vec<Vec<Option<char>>>, MemoryError> {
        self.pages.get(page).ok_or(MemoryError::NoSuchPage(page))
    }
}

impl Document for MemoryDocument {
    type Error = MemoryError;

    fn open(path: &Path) -> Result<Self, Self::Error> {
        let text = String::from_utf8(fs::read(path)?).map_err(|_| MemoryError::NotText)?;
        Ok(Self::new(
            text.split('\u{c}').map(|page| page.lines().collect()).collect(),
        ))
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn extract_runs(&self, page: usize) -> Result<Vec<TextRun>, Self::Error> {
        if self.fail_extract_on == Some(page) {
            return Err(MemoryError::Injected("extract"));
        }
        let lines = self.page(page)?;
        Ok((0..lines.len())
            .map(|line| TextRun {
                text: self.line_text(page, line),
                block: 0,
                line,
                glyphs: Vec::new(),
            })
            .collect())
    }

    fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Quad>, Self::Error> {
        self.search_calls.set(self.search_calls.get() + 1);
        let lines = self.page(page)?;
        let mut quads = Vec::new();
        if needle.is_empty() {
            return Ok(quads);
        }
        for line in 0..lines.len() {
            let text = self.line_text(page, line);
            for (byte, found) in text.match_indices(needle) {
                let start = text[..byte].chars().count();
                let end = start + found.chars().count() - 1;
                quads.push(Quad::span(&Self::glyph(line, start), &Self::glyph(line, end)));
            }
        }
        Ok(quads)
    }

    fn apply_redactions(
        &mut self,
        page: usize,
        request: &RedactionRequest,
    ) -> Result<usize, Self::Error> {
        if request.marks().iter().any(|m| !m.quad.is_valid()) {
            return Err(MemoryError::InvalidRegion);
        }
        let lines = self.pages.get_mut(page).ok_or(MemoryError::NoSuchPage(page))?;
        let mut removed = 0;
        for (l, line) in lines.iter_mut().enumerate() {
            for (i, slot) in line.iter_mut().enumerate() {
                let center = Self::glyph(l, i).center();
                if slot.is_some() && request.marks().iter().any(|m| m.quad.contains(center)) {
                    *slot = None;
                    removed += 1;
                }
            }
        }
        self.commits.push((page, request.len()));
        Ok(removed)
    }

    fn save(&mut self, path: &Path, _options: &SaveOptions) -> Result<(), Self::Error> {
        let pages: Vec<String> = (0..self.pages.len())
            .map(|page| {
                (0..self.pages[page].len())
                    .map(|line| self.line_text(page, line))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();
        fs::write(path, pages.join("\u{c}"))?;
        Ok(())
    }
}
