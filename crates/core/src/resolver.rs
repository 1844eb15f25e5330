//! Region resolver: turns a textual match into page regions.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::geometry::Quad;
use crate::scanner::Match;

/// How matches are mapped to geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolveStrategy {
    /// Search the whole page for the matched substring and cover every
    /// occurrence. Repeated text elsewhere on the page is covered too.
    #[default]
    PageSearch,
    /// Cover only the glyphs of the match inside its own run. Falls back to
    /// `PageSearch` when the run carries no glyph geometry.
    RunLocal,
}

/// A region to cover on a specific page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub page: usize,
    pub quad: Quad,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegionResolver {
    strategy: ResolveStrategy,
}

impl RegionResolver {
    pub fn new(strategy: ResolveStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ResolveStrategy {
        self.strategy
    }

    /// Regions for `m` on `page`.
    ///
    /// An empty result is a silent miss (the text could not be located), not
    /// an error.
    pub fn resolve<D: Document>(
        &self,
        doc: &D,
        page: usize,
        m: &Match<'_>,
    ) -> Result<Vec<Region>, D::Error> {
        if self.strategy == ResolveStrategy::RunLocal {
            if let Some(region) = run_local_region(page, m) {
                return Ok(vec![region]);
            }
            log::warn!(
                "[Resolver] run carries no glyph geometry, falling back to page search"
            );
        }
        self.resolve_text(doc, page, m.matched_text)
    }

    /// Whole-page search for `matched_text`, one region per occurrence.
    ///
    /// Empty and whitespace-only text is rejected before searching.
    pub fn resolve_text<D: Document>(
        &self,
        doc: &D,
        page: usize,
        matched_text: &str,
    ) -> Result<Vec<Region>, D::Error> {
        if matched_text.trim().is_empty() {
            log::warn!(
                "[Resolver] page {}: refusing to search for blank text {:?}",
                page + 1,
                matched_text
            );
            return Ok(Vec::new());
        }

        let quads = doc.search_text(page, matched_text)?;
        Ok(quads
            .into_iter()
            .map(|quad| Region { page, quad })
            .collect())
    }
}

fn run_local_region(page: usize, m: &Match<'_>) -> Option<Region> {
    if !m.run.has_glyph_geometry() {
        return None;
    }
    let chars = m.char_span();
    let first = m.run.glyphs.get(chars.start)?;
    let last = m.run.glyphs.get(chars.end.checked_sub(1)?)?;
    Some(Region {
        page,
        quad: Quad::span(first, last),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextRun;
    use crate::geometry::Rect;
    use crate::rules::{Category, PatternRegistry};
    use crate::scanner::RunScanner;
    use crate::test_support::MemoryDocument;

    #[test]
    fn test_page_search_covers_every_occurrence() {
        let doc = MemoryDocument::new(vec![vec![
            "Call 555-123-4567 today",
            "Fax 555-123-4567 anytime",
        ]]);
        let runs = doc.extract_runs(0).unwrap();
        let scanner = RunScanner::new(PatternRegistry::builtin());
        let first = scanner
            .scan(&runs[0])
            .into_iter()
            .find(|m| m.category == Category::Phone)
            .unwrap();

        let resolver = RegionResolver::default();
        let regions = resolver.resolve(&doc, 0, &first).unwrap();
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.page == 0));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let doc = MemoryDocument::new(vec![vec!["jane@example.com", "jane@example.com"]]);
        let resolver = RegionResolver::default();
        let a = resolver.resolve_text(&doc, 0, "jane@example.com").unwrap();
        let b = resolver.resolve_text(&doc, 0, "jane@example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let doc = MemoryDocument::new(vec![vec!["a b c"]]);
        let resolver = RegionResolver::default();
        assert!(resolver.resolve_text(&doc, 0, "").unwrap().is_empty());
        assert!(resolver.resolve_text(&doc, 0, "   ").unwrap().is_empty());
        assert_eq!(doc.search_calls(), 0);
    }

    #[test]
    fn test_unlocatable_text_is_a_silent_miss() {
        let doc = MemoryDocument::new(vec![vec!["Alice Bob"]]);
        let resolver = RegionResolver::default();
        assert!(resolver.resolve_text(&doc, 0, "Carol Dan").unwrap().is_empty());
    }

    #[test]
    fn test_run_local_uses_glyphs() {
        let mut run = TextRun::new("id 555-123-4567");
        run.glyphs = (0..run.text.chars().count())
            .map(|i| {
                let x = i as f32 * 10.0;
                Quad::from_rect(Rect::from_corners(x, 0.0, x + 10.0, 12.0))
            })
            .collect();
        let scanner = RunScanner::new(PatternRegistry::builtin());
        let m = scanner.scan(&run).into_iter().next().unwrap();

        // the document is never searched in run-local mode
        let doc = MemoryDocument::new(vec![vec![]]);
        let resolver = RegionResolver::new(ResolveStrategy::RunLocal);
        let regions = resolver.resolve(&doc, 0, &m).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0].quad.bounding_rect(),
            Rect::from_corners(30.0, 0.0, 150.0, 12.0)
        );
        assert_eq!(doc.search_calls(), 0);
    }

    #[test]
    fn test_run_local_falls_back_without_geometry() {
        let doc = MemoryDocument::new(vec![vec!["id 555-123-4567"]]);
        let runs = doc.extract_runs(0).unwrap();
        let scanner = RunScanner::new(PatternRegistry::builtin());
        let m = scanner.scan(&runs[0]).into_iter().next().unwrap();

        let resolver = RegionResolver::new(ResolveStrategy::RunLocal);
        let regions = resolver.resolve(&doc, 0, &m).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(doc.search_calls(), 1);
    }
}
