//! Runtime configuration for the notepad server

use std::path::PathBuf;
use std::time::Duration;

/// Options for one notepad server instance
#[derive(Debug, Clone)]
pub struct NotepadConfig {
    /// Configuration source (JSON list of PV definitions)
    pub config_path: PathBuf,
    /// Autosave file
    pub autosave_path: PathBuf,
    /// Prefix for the server's own helper variables
    pub prefix: String,
    /// Interface to bind the access protocol server to
    pub host: String,
    /// Port for the access protocol server
    pub port: u16,
    /// Time between configuration scans
    pub refresh_interval: Duration,
    /// Time between autosave flushes
    pub autosave_interval: Duration,
    /// Reject definitions that carry limits on a non-numeric value
    pub strict_limits: bool,
    /// Keep a `.bak` copy of the previous autosave file
    pub keep_backup: bool,
}

impl Default for NotepadConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.json"),
            autosave_path: PathBuf::from("notepad_autosave.json"),
            prefix: "PCDSDEVICES:Notepad:".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5064,
            refresh_interval: Duration::from_secs(10),
            autosave_interval: Duration::from_secs(10),
            strict_limits: false,
            keep_backup: true,
        }
    }
}

impl NotepadConfig {
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn with_autosave_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.autosave_path = path.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    pub fn with_strict_limits(mut self, strict: bool) -> Self {
        self.strict_limits = strict;
        self
    }

    /// Address of the refresh counter helper variable
    pub fn helper_address(&self) -> String {
        format!("{}file_checker_helper", self.prefix)
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NotepadConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(10));
        assert_eq!(config.helper_address(), "PCDSDEVICES:Notepad:file_checker_helper");
        assert_eq!(config.bind_addr(), "0.0.0.0:5064");
    }

    #[test]
    fn test_builders() {
        let config = NotepadConfig::default()
            .with_config_path("/tmp/c.json")
            .with_prefix("TST:")
            .with_refresh_interval(Duration::from_millis(50));
        assert_eq!(config.config_path, PathBuf::from("/tmp/c.json"));
        assert_eq!(config.helper_address(), "TST:file_checker_helper");
        assert_eq!(config.refresh_interval, Duration::from_millis(50));
    }
}
