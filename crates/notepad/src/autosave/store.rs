//! Autosave file
//!
//! Format: `{ "<address>": { "value": <json>, "timestamp": "<rfc3339>" } }`.
//! Bare values (`{ "<address>": 5 }`) are accepted on load.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};

use notepad_types::PvValue;

/// Persisted address -> value map
pub type PersistedState = BTreeMap<String, PvValue>;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to load autosave file {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Failed to write autosave file {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    value: PvValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AutosaveStore {
    path: PathBuf,
    keep_backup: bool,
}

impl AutosaveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep_backup: true,
        }
    }

    /// Copy the previous file to `<path>.bak` before each write
    pub fn with_backup(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Read the autosave file. Entries without a usable value are skipped.
    pub async fn load(&self) -> Result<PersistedState, PersistenceError> {
        let load_error = |reason: String| PersistenceError::Load {
            path: self.path.clone(),
            reason,
        };

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| load_error(e.to_string()))?;
        let raw: BTreeMap<String, Json> =
            serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?;

        let mut state = PersistedState::new();
        for (address, entry) in raw {
            let value = match entry {
                Json::Object(_) => serde_json::from_value::<PersistedEntry>(entry).map(|e| e.value),
                other => serde_json::from_value::<PvValue>(other),
            };
            match value {
                Ok(value) => {
                    state.insert(address, value);
                }
                Err(e) => warn!(address = %address, "Ignoring unreadable autosave entry: {}", e),
            }
        }

        debug!("Loaded {} autosaved values from {}", state.len(), self.path.display());
        Ok(state)
    }

    /// Like `load`, but a missing or corrupt file is an empty state
    pub async fn load_or_empty(&self) -> PersistedState {
        match self.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("{}; starting with no autosaved values", e);
                PersistedState::new()
            }
        }
    }

    /// Write `values` to the autosave file.
    ///
    /// The new content goes to a temp file in the same directory which then
    /// replaces the target, so a failed write leaves the previous file intact.
    pub async fn save(&self, values: &[(String, PvValue)]) -> Result<(), PersistenceError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let entries: BTreeMap<&str, PersistedEntry> = values
            .iter()
            .map(|(address, value)| {
                (
                    address.as_str(),
                    PersistedEntry {
                        value: value.clone(),
                        timestamp: Some(timestamp.clone()),
                    },
                )
            })
            .collect();

        let write_error = |reason: String| PersistenceError::Write {
            path: self.path.clone(),
            reason,
        };

        let content = serde_json::to_vec_pretty(&entries).map_err(|e| write_error(e.to_string()))?;

        let path = self.path.clone();
        let backup = self.keep_backup.then(|| self.backup_path());
        tokio::task::spawn_blocking(move || atomic_write(&path, backup.as_deref(), &content))
            .await
            .map_err(|e| write_error(e.to_string()))?
            .map_err(|e| write_error(e.to_string()))?;

        debug!("Saved {} values to {}", values.len(), self.path.display());
        Ok(())
    }
}

fn atomic_write(path: &Path, backup: Option<&Path>, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    if let Some(backup) = backup {
        if path.exists() {
            std::fs::copy(path, backup)?;
        }
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
