/// Generator settings, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::phonotactics::DEFAULT_BOUNDARY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Tunables for a [`WordGenerator`](crate::core::generator::WordGenerator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Seed for the generator's random source. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Lower length bound for `generate_configured`; 0 is unbounded.
    pub min_length: usize,
    /// Upper length bound for `generate_configured` and `sketch`; 0 falls
    /// back to `depth_limit`.
    pub max_length: usize,
    /// Longest word the search will try when no upper bound is given.
    pub depth_limit: usize,
    /// Marker that opens every word-in-progress and anchors
    /// word-initial contexts.
    pub boundary: String,
    /// Start nonterminal. Defaults to the first production's left side.
    pub root: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            min_length: 0,
            max_length: 0,
            depth_limit: 32,
            boundary: DEFAULT_BOUNDARY.to_string(),
            root: None,
        }
    }
}

impl GeneratorConfig {
    pub fn load_from_ron(path: &Path) -> Result<GeneratorConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<GeneratorConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = GeneratorConfig::default();
        assert_eq!(c.depth_limit, 32);
        assert_eq!(c.boundary, "_");
        assert!(c.seed.is_none());
    }

    #[test]
    fn partial_ron_fills_defaults() {
        let c = GeneratorConfig::parse_ron("(seed: Some(9), max_length: 6)").unwrap();
        assert_eq!(c.seed, Some(9));
        assert_eq!(c.max_length, 6);
        assert_eq!(c.depth_limit, 32);
        assert_eq!(c.boundary, "_");
    }

    #[test]
    fn load_fixture_config() {
        let path = std::path::PathBuf::from("tests/fixtures/generator.ron");
        let c = GeneratorConfig::load_from_ron(&path).unwrap();
        assert_eq!(c.seed, Some(42));
        assert_eq!(c.root.as_deref(), Some("Word"));
    }
}
