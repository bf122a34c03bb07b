//! Search settings
//!
//! Loaded from JSON; every key is optional.
//!
//! ```json
//! { "max_results": 500, "default_language": "en", "security_checks": true,
//!   "field_name_formats": ["{0}_t", "{0}_s"] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Page size requested when the query sets none.
    pub max_results: usize,
    /// Culture that needs no `_language` filter.
    pub default_language: String,
    /// Ask the security collaborator about every hit.
    pub security_checks: bool,
    /// Field name formats stripped from facet category names.
    pub field_name_formats: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 500,
            default_language: "en".to_string(),
            security_checks: true,
            field_name_formats: Vec::new(),
        }
    }
}

impl SearchSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SearchError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SearchError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Whether queries in `culture` must be scoped with a language filter.
    pub fn needs_language_filter(&self, culture: &str) -> bool {
        !self.default_language.starts_with(&language_code(culture))
    }
}

/// Primary language subtag of a culture name: `da-DK` -> `da`.
pub fn language_code(culture: &str) -> String {
    culture
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let settings = SearchSettings::from_json_str(r#"{ "max_results": 50 }"#).unwrap();
        assert_eq!(settings.max_results, 50);
        assert_eq!(settings.default_language, "en");
        assert!(settings.security_checks);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = SearchSettings::from_json_str("{ max_results").unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[test]
    fn language_code_drops_region() {
        assert_eq!(language_code("da-DK"), "da");
        assert_eq!(language_code("pt_BR"), "pt");
        assert_eq!(language_code("EN"), "en");
    }

    #[test]
    fn language_filter_only_for_other_cultures() {
        let settings = SearchSettings::default();
        assert!(!settings.needs_language_filter("en"));
        assert!(settings.needs_language_filter("da"));
        assert!(!settings.needs_language_filter("en-US"));
        assert!(!settings.needs_language_filter("EN_gb"));
        assert!(settings.needs_language_filter("da-DK"));
    }
}
