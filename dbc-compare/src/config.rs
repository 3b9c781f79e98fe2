//! Comparison configuration types
//!
//! This module defines the configuration needed by the comparison library.
//! Report formats and output locations belong to the application layer.

use crate::dbc::attributes::AttributeDictionary;
use serde::{Deserialize, Serialize};

/// Configuration for the comparison library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Compare bus pairs in parallel (default: true)
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Reject files that are not valid UTF-8 instead of reading them as Windows-1252
    #[serde(default)]
    pub strict_encoding: bool,

    /// Optional: fixed number of bus name segments in file names
    #[serde(default)]
    pub bus_segments: Option<usize>,

    /// Attribute dictionary every file is resolved against
    #[serde(skip, default = "AttributeDictionary::builtin")]
    pub dictionary: AttributeDictionary,
}

fn default_true() -> bool {
    true
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            strict_encoding: false,
            bus_segments: None,
            dictionary: AttributeDictionary::builtin(),
        }
    }
}

impl CompareConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable parallel comparison
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Builder method: enable strict UTF-8 decoding
    pub fn with_strict_encoding(mut self, enabled: bool) -> Self {
        self.strict_encoding = enabled;
        self
    }

    /// Builder method: set the number of bus name segments
    pub fn with_bus_segments(mut self, segments: usize) -> Self {
        self.bus_segments = Some(segments);
        self
    }

    /// Builder method: replace the attribute dictionary
    pub fn with_dictionary(mut self, dictionary: AttributeDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompareConfig::new();
        assert!(config.parallel);
        assert!(!config.strict_encoding);
        assert_eq!(config.bus_segments, None);
        assert_eq!(config.dictionary, AttributeDictionary::builtin());
    }

    #[test]
    fn test_builder_pattern() {
        let config = CompareConfig::new()
            .with_parallel(false)
            .with_strict_encoding(true)
            .with_bus_segments(2)
            .with_dictionary(AttributeDictionary::new());

        assert!(!config.parallel);
        assert!(config.strict_encoding);
        assert_eq!(config.bus_segments, Some(2));
        assert!(config.dictionary.is_empty());
    }

    #[test]
    fn test_deserialize_keeps_builtin_dictionary() {
        let config: CompareConfig = serde_json::from_str(r#"{"strict_encoding": true}"#).unwrap();
        assert!(config.parallel);
        assert!(config.strict_encoding);
        assert!(!config.dictionary.is_empty());
    }
}
