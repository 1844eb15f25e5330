//! pdfscrub: detect and permanently remove personal information from PDFs.

pub mod config;

use std::path::Path;

pub use config::{load_config, AppConfig, ConfigError};
pub use pdfscrub_core::{CoreError, PipelineState, RedactionReport};
pub use pdfscrub_verify::{Leak, VerifyResult};

use pdfscrub_core::{PatternRegistry, Pipeline};
use pdfscrub_pdf::PdfDocument;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Redaction(#[from] CoreError),
}

/// Redact `input` into `output` with the PDF engine.
pub fn redact_file(
    input: &Path,
    output: &Path,
    config: &AppConfig,
) -> Result<RedactionReport, AppError> {
    let configured = config.registry()?;
    let registry = configured.as_ref().unwrap_or_else(|| PatternRegistry::builtin());

    log::info!(
        "[App] redacting {} -> {} ({} rules, {:?})",
        input.display(),
        output.display(),
        registry.len(),
        config.strategy
    );

    let mut pipeline = Pipeline::new(registry, config.pipeline_options());
    let report = pipeline.run::<PdfDocument>(input, output)?;
    Ok(report)
}

/// Re-open `output` and search it for every term detected during redaction.
pub fn verify_file(output: &Path, report: &RedactionReport) -> VerifyResult {
    pdfscrub_verify::verify_output::<PdfDocument, _, _>(output, report.detected_terms())
}

/// One line per category, e.g. `EMAIL: 2`.
pub fn summarize(report: &RedactionReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .count_by_category()
        .into_iter()
        .map(|(category, count)| format!("{}: {}", category, count))
        .collect();
    let misses: usize = report.pages.iter().map(|p| p.misses()).sum();
    lines.push(format!(
        "{} pages, {} regions, {} glyphs removed, {} unresolved",
        report.pages.len(),
        report.total_regions(),
        report.pages.iter().map(|p| p.glyphs_removed).sum::<usize>(),
        misses
    ));
    lines
}
