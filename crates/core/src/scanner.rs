//! Run scanner: finds every category match inside a single text run.

use std::ops::Range;

use crate::document::TextRun;
use crate::rules::{Category, PatternRegistry};

/// A category hit inside one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'r> {
    pub category: Category,
    /// The literal matched substring
    pub matched_text: &'r str,
    /// Byte span of `matched_text` within the run's text
    pub span: Range<usize>,
    pub run: &'r TextRun,
}

impl Match<'_> {
    /// Character span within the run, for indexing per-character geometry.
    pub fn char_span(&self) -> Range<usize> {
        let text = &self.run.text;
        let start = text[..self.span.start].chars().count();
        let len = self.matched_text.chars().count();
        start..start + len
    }
}

/// Scans runs against a registry.
#[derive(Debug, Clone, Copy)]
pub struct RunScanner<'a> {
    registry: &'a PatternRegistry,
}

impl<'a> RunScanner<'a> {
    pub fn new(registry: &'a PatternRegistry) -> Self {
        Self { registry }
    }

    /// All matches in `run`: categories in registry order, and within a
    /// category left to right.
    ///
    /// Matches of different categories over the same characters are all
    /// reported; nothing is deduplicated.
    pub fn scan<'r>(&self, run: &'r TextRun) -> Vec<Match<'r>> {
        let mut matches = Vec::new();
        if run.text.is_empty() {
            return matches;
        }

        for rule in self.registry.rules() {
            for span in rule.find_spans(&run.text) {
                matches.push(Match {
                    category: rule.category().clone(),
                    matched_text: &run.text[span.clone()],
                    span,
                    run,
                });
            }
        }

        log::trace!("[Scanner] {} matches in run {:?}", matches.len(), run.text);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{PatternRule, RuleKind, RuleSpec};

    fn labels<'r>(matches: &[Match<'r>]) -> Vec<(&'r str, String)> {
        matches
            .iter()
            .map(|m| (m.matched_text, m.category.label().to_string()))
            .collect()
    }

    #[test]
    fn test_scan_orders_by_category_then_position() {
        let run = TextRun::new("Contact Jane Doe at jane.doe@example.com or 555-123-4567.");
        let scanner = RunScanner::new(PatternRegistry::builtin());
        let found = scanner.scan(&run);

        assert_eq!(
            labels(&found),
            vec![
                ("jane.doe@example.com", "EMAIL".to_string()),
                ("555-123-4567", "PHONE".to_string()),
                ("Contact Jane", "NAME".to_string()),
                ("Jane Doe", "NAME".to_string()),
            ]
        );
        for m in &found {
            assert_eq!(&run.text[m.span.clone()], m.matched_text);
        }
    }

    #[test]
    fn test_overlapping_categories_are_kept() {
        let mut registry = PatternRegistry::empty();
        registry.push(PatternRule::new(Category::Name, r"\b[A-Z][a-z]* [A-Z][a-z]*\b").unwrap());
        registry.push(PatternRule::keyword(Category::Custom("VIP".into()), "Ada Lovelace").unwrap());

        let run = TextRun::new("Ada Lovelace");
        let found = RunScanner::new(&registry).scan(&run);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].span, found[1].span);
        assert_ne!(found[0].category, found[1].category);
    }

    #[test]
    fn test_empty_run_yields_nothing() {
        let scanner = RunScanner::new(PatternRegistry::builtin());
        assert!(scanner.scan(&TextRun::new("")).is_empty());
        assert!(scanner.scan(&TextRun::new("nothing to see here")).is_empty());
    }

    #[test]
    fn test_char_span_with_multibyte_prefix() {
        let run = TextRun::new("Café bill: 555.123.4567");
        let registry = PatternRegistry::configured(
            &[],
            &[RuleSpec {
                name: "AMOUNT".into(),
                kind: RuleKind::Keyword,
                pattern: "bill".into(),
                enabled: false,
            }],
        )
        .unwrap();
        let found = RunScanner::new(&registry).scan(&run);
        let phone = found.iter().find(|m| m.category == Category::Phone).unwrap();
        assert_eq!(phone.span, 12..24);
        assert_eq!(phone.char_span(), 11..23);
    }
}
