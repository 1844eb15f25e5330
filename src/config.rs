use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use pdfscrub_core::{Color, PatternRegistry, PipelineOptions, ResolveStrategy, RuleSpec, SaveOptions};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    // ============ Redaction ============
    /// Overlay fill color, RGB components in `[0, 1]`
    pub fill_color: [f32; 3],
    pub strategy: ResolveStrategy,

    // ============ Detection rules ============
    /// Built-in categories to skip (`EMAIL`, `PHONE`, `NAME`)
    pub disabled_categories: Vec<String>,
    pub custom_rules: Vec<RuleSpec>,

    // ============ Output ============
    pub save: SaveOptions,
    /// Re-open the output and search it for every detected term
    pub verify: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fill_color: [0.0, 0.0, 0.0],
            strategy: ResolveStrategy::default(),
            disabled_categories: Vec::new(),
            custom_rules: Vec::new(),
            save: SaveOptions::default(),
            verify: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn fill(&self) -> Color {
        let [r, g, b] = self.fill_color;
        Color::rgb(r, g, b)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            strategy: self.strategy,
            fill: self.fill(),
            save: self.save,
        }
    }

    /// Registry for this configuration. Without disabled categories or
    /// custom rules the shared built-in registry is not copied.
    pub fn registry(&self) -> Result<Option<PatternRegistry>, ConfigError> {
        if self.disabled_categories.is_empty() && self.custom_rules.is_empty() {
            return Ok(None);
        }
        PatternRegistry::configured(&self.disabled_categories, &self.custom_rules)
            .map(Some)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fill().is_valid() {
            return Err(ConfigError::Invalid(format!(
                "fillColor components must lie in [0, 1], got {:?}",
                self.fill_color
            )));
        }
        for label in &self.disabled_categories {
            if pdfscrub_core::Category::builtin_from_label(label).is_none() {
                log::warn!("[Config] unknown category '{}' in disabledCategories", label);
            }
        }
        self.registry()?;
        Ok(())
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    log::debug!("[Config] loaded {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfscrub_core::{Category, RuleKind};
    use std::io::Write;

    fn write(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_object_is_default() {
        let file = write("{}");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.registry().unwrap().is_none());
        assert_eq!(config.fill(), Color::BLACK);
    }

    #[test]
    fn test_full_config() {
        let file = write(
            r#"{
                "fillColor": [1.0, 1.0, 1.0],
                "strategy": "runLocal",
                "disabledCategories": ["name"],
                "customRules": [
                    { "name": "EMPLOYEE_ID", "kind": "regex", "pattern": "\\bE\\d{6}\\b" },
                    { "name": "PROJECT", "kind": "keyword", "pattern": "Bluebird", "enabled": false }
                ],
                "save": { "garbage": false, "deflate": true },
                "verify": true
            }"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.strategy, ResolveStrategy::RunLocal);
        assert_eq!(config.custom_rules[0].kind, RuleKind::Regex);
        assert!(!config.custom_rules[1].enabled);
        assert!(!config.save.garbage);
        assert!(config.verify);

        let registry = config.registry().unwrap().unwrap();
        let categories: Vec<&Category> = registry.categories().collect();
        assert_eq!(
            categories,
            vec![
                &Category::Email,
                &Category::Phone,
                &Category::Custom("EMPLOYEE_ID".into())
            ]
        );
    }

    #[test]
    fn test_fill_color_out_of_range() {
        let file = write(r#"{ "fillColor": [0.0, 1.5, 0.0] }"#);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_custom_regex_fails_loading() {
        let file = write(r#"{ "customRules": [{ "name": "BROKEN", "kind": "regex", "pattern": "(" }] }"#);
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("BROKEN"), "{}", err);
    }

    #[test]
    fn test_malformed_json() {
        let file = write("{ not json");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Json(_))));
    }
}
