//! Pattern registry
//!
//! Named PII categories and their matching rules. The built-in registry is
//! compiled once and shared read-only for the lifetime of the process;
//! configured registries append custom rules after the built-ins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::{CoreError, Result};

/// Local part, `@`, dot separated domain labels, alphabetic TLD.
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
/// 3-3-4 digits, optional single `-` or `.` between groups.
const PHONE_PATTERN: &str = r"\b[0-9]{3}[-.]?[0-9]{3}[-.]?[0-9]{4}\b";
/// Two capitalized tokens separated by exactly one space.
const NAME_PATTERN: &str = r"\b[A-Z][a-z]* [A-Z][a-z]*\b";

static BUILTIN: Lazy<PatternRegistry> = Lazy::new(|| PatternRegistry {
    rules: vec![
        PatternRule::builtin(Category::Email, EMAIL_PATTERN),
        PatternRule::builtin(Category::Phone, PHONE_PATTERN),
        PatternRule::builtin(Category::Name, NAME_PATTERN),
    ],
});

/// PII category label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Email,
    Phone,
    /// Any "Capitalized Word" pair; deliberately broad
    Name,
    /// Category defined by a configured rule
    Custom(String),
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::Email => "EMAIL",
            Category::Phone => "PHONE",
            Category::Name => "NAME",
            Category::Custom(name) => name,
        }
    }

    /// Resolve a label back to a built-in category, case-insensitively.
    pub fn builtin_from_label(label: &str) -> Option<Category> {
        match label.to_ascii_uppercase().as_str() {
            "EMAIL" => Some(Category::Email),
            "PHONE" => Some(Category::Phone),
            "NAME" => Some(Category::Name),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a configured rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    /// Regular expression
    Regex,
    /// Literal keyword, word-bounded
    Keyword,
}

/// A configured matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Category label reported for matches
    pub name: String,
    pub kind: RuleKind,
    pub pattern: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// One category and its matcher.
#[derive(Debug, Clone)]
pub struct PatternRule {
    category: Category,
    regex: Regex,
}

impl PatternRule {
    /// Compile a rule from a regular expression.
    pub fn new(category: Category, pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            category,
            regex: Regex::new(pattern)?,
        })
    }

    /// A rule matching `keyword` literally. Word boundaries are added on the
    /// sides where the keyword starts or ends with a word character.
    pub fn keyword(category: Category, keyword: &str) -> std::result::Result<Self, regex::Error> {
        let is_word = |c: char| c.is_alphanumeric() || c == '_';
        let mut pattern = String::new();
        if keyword.chars().next().is_some_and(is_word) {
            pattern.push_str(r"\b");
        }
        pattern.push_str(&regex::escape(keyword));
        if keyword.chars().last().is_some_and(is_word) {
            pattern.push_str(r"\b");
        }
        Self::new(category, &pattern)
    }

    fn builtin(category: Category, pattern: &str) -> Self {
        // the built-in patterns are constants covered by tests
        Self::new(category, pattern).expect("built-in pattern must compile")
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Byte spans of every match, left to right.
    ///
    /// After a span starting at `s` the search resumes at the character after
    /// `s`, so a later span may overlap an earlier one ("Contact Jane Doe"
    /// yields "Contact Jane" and "Jane Doe"). A span that ends at or before
    /// the furthest end already reported is skipped, unless a plain
    /// non-overlapping scan would also report it. Empty spans are never
    /// reported.
    pub fn find_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut from = 0;
        let mut covered_to = 0;
        // end of the last span a non-overlapping scan would report
        let mut scanned_to = 0;

        while from <= text.len() {
            let Some(m) = self.regex.find_at(text, from) else {
                break;
            };
            if !m.range().is_empty() {
                let disjoint = m.start() >= scanned_to;
                if disjoint {
                    scanned_to = m.end();
                }
                if disjoint || m.end() > covered_to {
                    spans.push(m.range());
                    covered_to = covered_to.max(m.end());
                }
            }
            match text[m.start()..].chars().next() {
                Some(c) => from = m.start() + c.len_utf8(),
                None => break,
            }
        }

        spans
    }
}

/// Ordered mapping from category to matcher.
///
/// Evaluation order is insertion order: EMAIL, PHONE, NAME, then custom
/// rules in configuration order.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    rules: Vec<PatternRule>,
}

impl PatternRegistry {
    /// The process-wide built-in registry.
    pub fn builtin() -> &'static PatternRegistry {
        &BUILTIN
    }

    /// Empty registry
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Built-ins minus `disabled` (labels, case-insensitive), followed by the
    /// enabled `custom` rules.
    pub fn configured(disabled: &[String], custom: &[RuleSpec]) -> Result<Self> {
        let mut registry = Self::empty();

        for rule in Self::builtin().rules() {
            let off = disabled
                .iter()
                .any(|label| label.eq_ignore_ascii_case(rule.category().label()));
            if off {
                log::info!("[Rules] built-in category {} disabled", rule.category());
            } else {
                registry.push(rule.clone());
            }
        }

        for spec in custom.iter().filter(|s| s.enabled) {
            if spec.name.trim().is_empty() {
                return Err(CoreError::InvalidRule {
                    name: spec.name.clone(),
                    reason: "rule name is empty".to_string(),
                });
            }
            let category = Category::builtin_from_label(&spec.name)
                .unwrap_or_else(|| Category::Custom(spec.name.clone()));
            let compiled = match spec.kind {
                RuleKind::Regex => PatternRule::new(category, &spec.pattern),
                RuleKind::Keyword if spec.pattern.trim().is_empty() => {
                    return Err(CoreError::InvalidRule {
                        name: spec.name.clone(),
                        reason: "keyword is empty".to_string(),
                    });
                }
                RuleKind::Keyword => PatternRule::keyword(category, &spec.pattern),
            };
            let rule = compiled.map_err(|e| CoreError::InvalidRule {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;
            log::debug!("[Rules] custom rule {} = {}", rule.category(), rule.pattern());
            registry.push(rule);
        }

        Ok(registry)
    }

    pub fn push(&mut self, rule: PatternRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn get(&self, category: &Category) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.category() == category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.rules.iter().map(PatternRule::category)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
