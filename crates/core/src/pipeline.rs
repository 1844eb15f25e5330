//! Page pipeline
//!
//! Drives scanner -> resolver -> applicator over every page of a document,
//! strictly in page order, committing each page once before moving on.
//!
//! State machine:
//! `Idle -> Opened -> {Scanning -> Resolving -> Committing}* -> Saved -> Closed`,
//! with `Failed` reachable from every step. Nothing is retried.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::applicator::RedactionApplicator;
use crate::document::{Document, SaveOptions};
use crate::geometry::Color;
use crate::resolver::{RegionResolver, ResolveStrategy};
use crate::rules::{Category, PatternRegistry};
use crate::scanner::{Match, RunScanner};
use crate::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Opened,
    Scanning { page: usize },
    Resolving { page: usize },
    Committing { page: usize },
    Saved,
    Closed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Opened => write!(f, "opened"),
            PipelineState::Scanning { page } => write!(f, "scanning page {}", page + 1),
            PipelineState::Resolving { page } => write!(f, "resolving page {}", page + 1),
            PipelineState::Committing { page } => write!(f, "committing page {}", page + 1),
            PipelineState::Saved => write!(f, "saved"),
            PipelineState::Closed => write!(f, "closed"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Tunables of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineOptions {
    pub strategy: ResolveStrategy,
    pub fill: Color,
    pub save: SaveOptions,
}

/// One match and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub category: Category,
    pub text: String,
    /// Regions resolved for this match; zero is a resolve-miss
    pub regions: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageReport {
    pub page: usize,
    pub runs: usize,
    pub matches: Vec<MatchRecord>,
    pub regions: usize,
    pub glyphs_removed: usize,
}

impl PageReport {
    pub fn misses(&self) -> usize {
        self.matches.iter().filter(|m| m.regions == 0).count()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RedactionReport {
    pub output: Option<PathBuf>,
    pub pages: Vec<PageReport>,
}

impl RedactionReport {
    pub fn total_matches(&self) -> usize {
        self.pages.iter().map(|p| p.matches.len()).sum()
    }

    pub fn total_regions(&self) -> usize {
        self.pages.iter().map(|p| p.regions).sum()
    }

    /// Match count per category label.
    pub fn count_by_category(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for m in self.pages.iter().flat_map(|p| &p.matches) {
            *counts.entry(m.category.label().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Every distinct matched substring.
    pub fn detected_terms(&self) -> BTreeSet<String> {
        self.pages
            .iter()
            .flat_map(|p| &p.matches)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn matches_of(&self, category: &Category) -> Vec<&str> {
        self.pages
            .iter()
            .flat_map(|p| &p.matches)
            .filter(|m| &m.category == category)
            .map(|m| m.text.as_str())
            .collect()
    }
}

pub struct Pipeline<'a> {
    registry: &'a PatternRegistry,
    resolver: RegionResolver,
    fill: Color,
    save: SaveOptions,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a PatternRegistry, options: PipelineOptions) -> Self {
        Self {
            registry,
            resolver: RegionResolver::new(options.strategy),
            fill: options.fill,
            save: options.save,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Open `input`, redact every page, save to `output`.
    ///
    /// On failure the pipeline ends in `Failed` and `output` is not written
    /// by this run unless the failure happened while saving.
    pub fn run<D: Document>(&mut self, input: &Path, output: &Path) -> Result<RedactionReport> {
        let result = self.execute::<D>(input, output);
        if let Err(e) = &result {
            log::error!("[Pipeline] {}", e);
            if self.state != PipelineState::Failed {
                self.transition(PipelineState::Failed);
            }
        }
        result
    }

    fn execute<D: Document>(&mut self, input: &Path, output: &Path) -> Result<RedactionReport> {
        if !input.exists() {
            return Err(CoreError::InputNotFound(input.to_path_buf()));
        }

        log::info!("[Pipeline] opening {}", input.display());
        let mut doc = D::open(input).map_err(|e| CoreError::DocumentOpen {
            path: input.to_path_buf(),
            source: Box::new(e),
        })?;
        self.transition(PipelineState::Opened);
        log::info!("[Pipeline] document opened, {} pages", doc.page_count());

        let pages = self.process(&mut doc)?;

        log::info!("[Pipeline] saving to {}", output.display());
        doc.save(output, &self.save).map_err(|e| CoreError::Save {
            path: output.to_path_buf(),
            source: Box::new(e),
        })?;
        self.transition(PipelineState::Saved);

        doc.close();
        self.transition(PipelineState::Closed);
        log::info!("[Pipeline] redacted document saved as {}", output.display());

        Ok(RedactionReport {
            output: Some(output.to_path_buf()),
            pages,
        })
    }

    /// Redact every page of an already opened document, in order.
    pub fn process<D: Document>(&mut self, doc: &mut D) -> Result<Vec<PageReport>> {
        let count = doc.page_count();
        let mut reports = Vec::with_capacity(count);
        let mut applicator = RedactionApplicator::new();

        for page in 0..count {
            log::info!("[Pipeline] processing page {}/{}", page + 1, count);
            let report = self.process_page(doc, page, &mut applicator).map_err(|source| {
                CoreError::PageProcessing {
                    page,
                    source: Box::new(source),
                }
            });
            match report {
                Ok(report) => reports.push(report),
                Err(e) => {
                    self.transition(PipelineState::Failed);
                    return Err(e);
                }
            }
        }

        Ok(reports)
    }

    fn process_page<D: Document>(
        &mut self,
        doc: &mut D,
        page: usize,
        applicator: &mut RedactionApplicator,
    ) -> std::result::Result<PageReport, D::Error> {
        self.transition(PipelineState::Scanning { page });
        let runs = doc.extract_runs(page)?;
        let scanner = RunScanner::new(self.registry);
        let matches: Vec<Match<'_>> = runs.iter().flat_map(|run| scanner.scan(run)).collect();
        log::debug!(
            "[Pipeline] page {}: {} runs, {} matches",
            page + 1,
            runs.len(),
            matches.len()
        );

        self.transition(PipelineState::Resolving { page });
        let mut report = PageReport {
            page,
            runs: runs.len(),
            ..PageReport::default()
        };
        for m in &matches {
            let regions = self.resolver.resolve(&*doc, page, m)?;
            if regions.is_empty() {
                log::info!(
                    "[Pipeline] page {}: {} '{}' could not be located on the page",
                    page + 1,
                    m.category,
                    mask_snippet(m.matched_text)
                );
            }
            for region in &regions {
                log::info!(
                    "[Pipeline] Redacting {}: '{}' at {}",
                    m.category,
                    mask_snippet(m.matched_text),
                    region.quad
                );
                log::debug!("[Pipeline] full text: {:?}", m.matched_text);
                applicator.mark(*region, self.fill);
            }
            report.regions += regions.len();
            report.matches.push(MatchRecord {
                category: m.category.clone(),
                text: m.matched_text.to_string(),
                regions: regions.len(),
            });
        }

        self.transition(PipelineState::Committing { page });
        report.glyphs_removed = applicator.commit(doc, page)?;
        log::info!("[Pipeline] redactions applied to page {}", page + 1);

        Ok(report)
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("[Pipeline] {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// Mask the middle of a sensitive string for logging.
pub fn mask_snippet(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= 4 {
        "*".repeat(len)
    } else {
        let visible = 4.min(len / 3);
        let prefix: String = chars[..visible].iter().collect();
        let suffix: String = chars[len - visible..].iter().collect();
        format!("{}****{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryDocument;

    fn pipeline() -> Pipeline<'static> {
        Pipeline::new(PatternRegistry::builtin(), PipelineOptions::default())
    }

    #[test]
    fn test_contact_line_end_to_end() {
        let mut doc = MemoryDocument::new(vec![vec![
            "Contact Jane Doe at jane.doe@example.com or 555-123-4567.",
        ]]);
        let mut pipeline = pipeline();
        let pages = pipeline.process(&mut doc).unwrap();
        let report = RedactionReport {
            output: None,
            pages,
        };

        assert!(report.matches_of(&Category::Name).contains(&"Jane Doe"));
        assert_eq!(report.matches_of(&Category::Email), vec!["jane.doe@example.com"]);
        assert_eq!(report.matches_of(&Category::Phone), vec!["555-123-4567"]);

        for term in ["Jane Doe", "jane.doe@example.com", "555-123-4567"] {
            assert!(doc.search_text(0, term).unwrap().is_empty(), "{} still visible", term);
        }
        assert_eq!(
            doc.line_text(0, 0).split_whitespace().collect::<Vec<_>>(),
            vec!["at", "or", "."]
        );
    }

    #[test]
    fn test_repeated_text_is_covered_everywhere() {
        let mut doc = MemoryDocument::new(vec![vec![
            "Call 555-123-4567 now",
            "Reference number",
            "again 555-123-4567",
        ]]);
        let mut pipeline = pipeline();
        let pages = pipeline.process(&mut doc).unwrap();

        // detected on two lines, each detection covers both occurrences
        assert_eq!(pages[0].matches.len(), 2);
        assert_eq!(pages[0].regions, 4);
        assert!(doc.line_text(0, 0).starts_with("Call ") && !doc.line_text(0, 0).contains("555"));
        assert!(!doc.line_text(0, 2).contains("555"));
        assert_eq!(doc.line_text(0, 1), "Reference number");
    }

    #[test]
    fn test_one_commit_per_page_in_order() {
        let mut doc = MemoryDocument::new(vec![
            vec!["a@b.io", "c@d.io"],
            vec!["no pii here"],
            vec!["555.123.4567"],
        ]);
        let mut pipeline = pipeline();
        pipeline.process(&mut doc).unwrap();

        // page 1 has nothing to commit, so the engine is not called for it
        assert_eq!(doc.commits(), vec![(0, 2), (2, 1)]);

        let states: Vec<PipelineState> = pipeline
            .history()
            .iter()
            .copied()
            .filter(|s| matches!(s, PipelineState::Committing { .. }))
            .collect();
        assert_eq!(
            states,
            vec![
                PipelineState::Committing { page: 0 },
                PipelineState::Committing { page: 1 },
                PipelineState::Committing { page: 2 },
            ]
        );
    }

    #[test]
    fn test_per_page_state_order() {
        let mut doc = MemoryDocument::new(vec![vec!["x"]]);
        let mut pipeline = pipeline();
        pipeline.process(&mut doc).unwrap();
        assert_eq!(
            pipeline.history(),
            &[
                PipelineState::Idle,
                PipelineState::Scanning { page: 0 },
                PipelineState::Resolving { page: 0 },
                PipelineState::Committing { page: 0 },
            ]
        );
    }

    #[test]
    fn test_missing_input_never_opens() {
        let mut pipeline = pipeline();
        let err = pipeline
            .run::<MemoryDocument>(
                Path::new("/definitely/not/here.pdf"),
                Path::new("/tmp/out.pdf"),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InputNotFound(_)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(!pipeline.history().contains(&PipelineState::Opened));
    }

    #[test]
    fn test_open_failure_is_reported() {
        let mut pipeline = pipeline();
        let input = std::env::current_dir().unwrap();
        let err = pipeline
            .run::<MemoryDocument>(&input, Path::new("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, CoreError::DocumentOpen { .. }));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_run_walks_every_state_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "Call 555-123-4567\nnothing\u{c}write to jane@example.com").unwrap();

        let mut pipeline = pipeline();
        let report = pipeline.run::<MemoryDocument>(&input, &output).unwrap();

        assert_eq!(report.output.as_deref(), Some(output.as_path()));
        assert_eq!(report.total_matches(), 2);
        assert_eq!(
            pipeline.history(),
            &[
                PipelineState::Idle,
                PipelineState::Opened,
                PipelineState::Scanning { page: 0 },
                PipelineState::Resolving { page: 0 },
                PipelineState::Committing { page: 0 },
                PipelineState::Scanning { page: 1 },
                PipelineState::Resolving { page: 1 },
                PipelineState::Committing { page: 1 },
                PipelineState::Saved,
                PipelineState::Closed,
            ]
        );

        let saved = MemoryDocument::open(&output).unwrap();
        assert_eq!(saved.page_count(), 2);
        assert_eq!(saved.line_text(0, 0).trim_end(), "Call");
        assert_eq!(saved.line_text(0, 1), "nothing");
        assert_eq!(saved.line_text(1, 0).trim_end(), "write to");
    }

    #[test]
    fn test_save_failure_never_reaches_saved() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("missing").join("out.txt");
        std::fs::write(&input, "Call 555-123-4567").unwrap();

        let mut pipeline = pipeline();
        let err = pipeline.run::<MemoryDocument>(&input, &output).unwrap_err();

        assert!(matches!(err, CoreError::Save { .. }));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(
            &pipeline.history()[pipeline.history().len() - 2..],
            &[PipelineState::Committing { page: 0 }, PipelineState::Failed]
        );
        assert!(!pipeline.history().contains(&PipelineState::Saved));
        assert!(!output.exists());
    }

    #[test]
    fn test_page_failure_stops_pipeline() {
        let mut doc = MemoryDocument::new(vec![vec!["a@b.io"], vec!["c@d.io"], vec!["e@f.io"]]);
        doc.fail_extract_on = Some(1);
        let mut pipeline = pipeline();

        let err = pipeline.process(&mut doc).unwrap_err();
        match err {
            CoreError::PageProcessing { page, .. } => assert_eq!(page, 1),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(pipeline.state(), PipelineState::Failed);
        // page 0 was committed before the failure, page 2 never reached
        assert_eq!(doc.commits(), vec![(0, 1)]);
    }

    #[test]
    fn test_commit_order_does_not_matter() {
        let lines = vec!["Jane Doe 555-123-4567 jane@example.com"];
        let terms = ["jane@example.com", "555-123-4567", "Jane Doe"];

        let mut forward = MemoryDocument::new(vec![lines.clone()]);
        let mut backward = MemoryDocument::new(vec![lines]);
        let resolver = RegionResolver::default();

        for (doc, order) in [
            (&mut forward, terms.to_vec()),
            (&mut backward, terms.iter().rev().copied().collect()),
        ] {
            let mut applicator = RedactionApplicator::new();
            for term in order {
                for region in resolver.resolve_text(&*doc, 0, term).unwrap() {
                    applicator.mark(region, Color::BLACK);
                }
            }
            applicator.commit(doc, 0).unwrap();
        }

        assert_eq!(forward.line_text(0, 0), backward.line_text(0, 0));
    }

    #[test]
    fn test_report_counts() {
        let mut doc = MemoryDocument::new(vec![vec!["Alice Bob", "bob@example.com"]]);
        let mut pipeline = pipeline();
        let report = RedactionReport {
            output: None,
            pages: pipeline.process(&mut doc).unwrap(),
        };
        let counts = report.count_by_category();
        assert_eq!(counts.get("EMAIL"), Some(&1));
        assert_eq!(counts.get("NAME"), Some(&1));
        assert_eq!(report.total_regions(), 2);
        assert_eq!(report.pages[0].misses(), 0);
    }

    #[test]
    fn test_mask_snippet() {
        assert_eq!(mask_snippet("abc"), "***");
        assert_eq!(mask_snippet("555-123-4567"), "555-****4567");
        assert_eq!(mask_snippet("Jane Doe"), "Ja****oe");
    }
}
