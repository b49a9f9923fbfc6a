//! Configuration Loader
//!
//! Loads PV definitions from a JSON file on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use notepad_types::PvDefinition;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration must be a JSON list of PV definitions")]
    NotAList,
}

/// A place PV definitions are read from
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Read every definition currently declared
    ///
    /// Entries that are not valid definitions are skipped with a warning;
    /// only an unreadable or unparseable source is an error.
    async fn load(&self) -> Result<Vec<PvDefinition>, SourceError>;
}

/// Configuration source backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for JsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Vec<PvDefinition>, SourceError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;

        let definitions = parse_definitions(&content)?;
        debug!(
            "Loaded {} PV definitions from {}",
            definitions.len(),
            self.path.display()
        );
        Ok(definitions)
    }
}

/// Parse a JSON list of definitions, skipping malformed entries
pub fn parse_definitions(content: &str) -> Result<Vec<PvDefinition>, SourceError> {
    let raw: Value = serde_json::from_str(content)?;
    let Value::Array(entries) = raw else {
        return Err(SourceError::NotAList);
    };

    let mut definitions = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let read_pv = entry
            .get("read_pv")
            .and_then(|v| v.as_str())
            .unwrap_or("<missing read_pv>")
            .to_string();

        match serde_json::from_value::<PvDefinition>(entry) {
            Ok(definition) => definitions.push(definition),
            Err(e) => {
                warn!("Skipping malformed PV definition #{} ({}): {}", index, read_pv, e);
            }
        }
    }

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_malformed_entries() {
        let content = r#"[
            {"read_pv": "TST:A"},
            {"write_pv": "TST:NO_READ"},
            {"read_pv": "TST:B", "upper_ctrl_limit": "high"},
            {"read_pv": "TST:C", "record_type": "bo", "default_value": 1}
        ]"#;

        let definitions = parse_definitions(content).unwrap();
        let names: Vec<_> = definitions.iter().map(|d| d.read_pv.as_str()).collect();
        assert_eq!(names, vec!["TST:A", "TST:C"]);
    }

    #[test]
    fn test_parse_rejects_non_list() {
        assert!(matches!(
            parse_definitions(r#"{"read_pv": "TST:A"}"#),
            Err(SourceError::NotAList)
        ));
        assert!(matches!(parse_definitions("not json"), Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"[{"read_pv": "TST:A", "write_pv": "TST:A_SP"}]"#)
            .await
            .unwrap();

        let source = JsonFileSource::new(&path);
        let definitions = source.load().await.unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].write_pv.as_deref(), Some("TST:A_SP"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileSource::new(dir.path().join("absent.json"));
        assert!(matches!(source.load().await, Err(SourceError::Read { .. })));
    }
}
