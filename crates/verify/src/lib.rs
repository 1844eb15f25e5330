//! Post-processing verification checks.
//!
//! Re-opens a redacted output with the same engine that produced it and
//! searches every page for the substrings that were detected before
//! redaction. Anything still findable is a leak.

use std::path::Path;

use pdfscrub_core::{mask_snippet, Document};
use serde::{Deserialize, Serialize};

/// A detected substring that is still present in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leak {
    /// Zero-based page index
    pub page: usize,
    pub term: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub ok: bool,
    pub leaks: Vec<Leak>,
    pub warnings: Vec<String>,
}

pub fn verify_output<D, I, S>(output_path: &Path, terms: I) -> VerifyResult
where
    D: Document,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = VerifyResult {
        ok: true,
        ..VerifyResult::default()
    };

    let doc = match D::open(output_path) {
        Ok(doc) => doc,
        Err(e) => {
            result.ok = false;
            result
                .warnings
                .push(format!("cannot open {}: {}", output_path.display(), e));
            return result;
        }
    };

    let terms: Vec<S> = terms
        .into_iter()
        .filter(|t| !t.as_ref().trim().is_empty())
        .collect();

    for page in 0..doc.page_count() {
        for term in &terms {
            let term = term.as_ref();
            match doc.search_text(page, term) {
                Ok(quads) if quads.is_empty() => {}
                Ok(quads) => {
                    log::warn!(
                        "[Verify] page {}: '{}' still present {} time(s)",
                        page + 1,
                        mask_snippet(term),
                        quads.len()
                    );
                    result.leaks.push(Leak {
                        page,
                        term: term.to_string(),
                        occurrences: quads.len(),
                    });
                }
                Err(e) => {
                    result
                        .warnings
                        .push(format!("page {}: search failed: {}", page + 1, e));
                }
            }
        }
    }

    if !result.leaks.is_empty() || !result.warnings.is_empty() {
        result.ok = false;
    }
    log::info!(
        "[Verify] {} terms checked over {} pages, {} leaks",
        terms.len(),
        doc.page_count(),
        result.leaks.len()
    );
    doc.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfscrub_core::{Quad, Rect, RedactionRequest, SaveOptions, TextRun};
    use std::path::PathBuf;

    /// Opens "files" from a fixed table of page texts keyed by path.
    #[derive(Debug)]
    struct FixtureDoc {
        pages: Vec<&'static str>,
    }

    #[derive(Debug)]
    struct FixtureError(&'static str);

    impl std::fmt::Display for FixtureError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for FixtureError {}

    impl Document for FixtureDoc {
        type Error = FixtureError;

        fn open(path: &Path) -> Result<Self, Self::Error> {
            match path.to_str() {
                Some("clean.pdf") => Ok(Self {
                    pages: vec!["Contact at or", "nothing"],
                }),
                Some("leaky.pdf") => Ok(Self {
                    pages: vec!["Call 555-123-4567", "again 555-123-4567 and 555-123-4567"],
                }),
                _ => Err(FixtureError("not a pdf")),
            }
        }

        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn extract_runs(&self, page: usize) -> Result<Vec<TextRun>, Self::Error> {
            Ok(vec![TextRun::new(self.pages[page])])
        }

        fn search_text(&self, page: usize, needle: &str) -> Result<Vec<Quad>, Self::Error> {
            let quad = Quad::from_rect(Rect::from_corners(0.0, 0.0, 1.0, 1.0));
            Ok(self.pages[page].matches(needle).map(|_| quad).collect())
        }

        fn apply_redactions(
            &mut self,
            _page: usize,
            _request: &RedactionRequest,
        ) -> Result<usize, Self::Error> {
            Err(FixtureError("read only"))
        }

        fn save(&mut self, _path: &Path, _options: &SaveOptions) -> Result<(), Self::Error> {
            Err(FixtureError("read only"))
        }
    }

    #[test]
    fn test_clean_output_passes() {
        let result = verify_output::<FixtureDoc, _, _>(
            &PathBuf::from("clean.pdf"),
            ["Jane Doe", "555-123-4567"],
        );
        assert!(result.ok);
        assert!(result.leaks.is_empty());
    }

    #[test]
    fn test_leaks_are_reported_per_page() {
        let result = verify_output::<FixtureDoc, _, _>(
            &PathBuf::from("leaky.pdf"),
            vec!["555-123-4567".to_string(), " ".to_string()],
        );
        assert!(!result.ok);
        assert_eq!(
            result.leaks,
            vec![
                Leak {
                    page: 0,
                    term: "555-123-4567".into(),
                    occurrences: 1
                },
                Leak {
                    page: 1,
                    term: "555-123-4567".into(),
                    occurrences: 2
                },
            ]
        );
    }

    #[test]
    fn test_unopenable_output_is_a_warning() {
        let result = verify_output::<FixtureDoc, _, _>(&PathBuf::from("missing.pdf"), ["x"]);
        assert!(!result.ok);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.leaks.is_empty());
    }
}
