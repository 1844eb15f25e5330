//! Core orchestration for PII redaction.
//!
//! The document engine is abstracted behind [`Document`]; everything here
//! works on text runs, regions and pending redactions only.

pub mod applicator;
pub mod document;
pub mod geometry;
pub mod pipeline;
pub mod resolver;
pub mod rules;
pub mod scanner;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

pub use applicator::{RedactionApplicator, RedactionMark, RedactionRequest};
pub use document::{Document, SaveOptions, TextRun};
pub use geometry::{Color, Point, Quad, Rect};
pub use pipeline::{
    mask_snippet, MatchRecord, PageReport, Pipeline, PipelineOptions, PipelineState,
    RedactionReport,
};
pub use resolver::{Region, RegionResolver, ResolveStrategy};
pub use rules::{Category, PatternRegistry, PatternRule, RuleKind, RuleSpec};
pub use scanner::{Match, RunScanner};

pub type Result<T> = std::result::Result<T, CoreError>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("failed to open document {}: {source}", .path.display())]
    DocumentOpen {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("failed to process page {}: {source}", .page + 1)]
    PageProcessing {
        /// Zero-based page index
        page: usize,
        #[source]
        source: BoxError,
    },
    #[error("failed to save document to {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("invalid rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },
}
