//! Runtime configuration.

use glot_logger::Severity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration handed to [`crate::Glot`] by the host.
///
/// Programmatic construction is the primary path; the CLI also reads it
/// from a `glot.json` file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Root of the on-disk package layout (`modules/`, `plugins/`).
    pub base_dir: PathBuf,

    /// Repository manifest URLs consulted by the package manager.
    pub repositories: Vec<String>,

    /// Console log threshold; `None` keeps the logger's default.
    pub log_severity: Option<Severity>,

    /// Make loaded modules prefer their own symbols over already-loaded ones.
    pub prefer_own_symbols: Option<bool>,
}

impl Config {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Config {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Load a configuration file from disk.
    pub fn load_from_path(path: &Path) -> Result<Self, crate::packages::PackageError> {
        let json = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_fields() {
        let json = r#"{
            "baseDir": "/srv/glot",
            "repositories": ["https://repo.example.org/packages.json"],
            "logSeverity": "debug",
            "preferOwnSymbols": true
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/srv/glot"));
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.log_severity, Some(Severity::Debug));
        assert_eq!(config.prefer_own_symbols, Some(true));
    }

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: Config = serde_json::from_str(r#"{ "baseDir": "res" }"#).unwrap();
        assert!(config.repositories.is_empty());
        assert_eq!(config.log_severity, None);
        assert_eq!(config.prefer_own_symbols, None);
    }
}
