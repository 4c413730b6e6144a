//! Server configuration.
//!
//! Settings are read from a camelCase JSON file. Every field has a default,
//! so a missing file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::path::{parse_filters, Filter, FilterError};

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Read error: {0}")]
    ReadError(#[from] std::io::Error),

    /// Configuration data is invalid.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Address the IPC server listens on.
    pub bind_address: String,

    /// Name announced in the hello message.
    pub server_name: String,

    /// Warn when the model lock is held longer than this.
    pub max_lock_time_ms: u64,

    /// Interval of the built-in model updater.
    pub update_interval_ms: u64,

    /// Filters applied to subscriptions that do not specify any.
    pub default_filters: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9888".to_string(),
            server_name: "dsf-rs".to_string(),
            max_lock_time_ms: 250,
            update_interval_ms: 1000,
            default_filters: String::new(),
        }
    }
}

impl ServerSettings {
    /// Load settings from a file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    /// Parse the default subscription filters.
    pub fn default_filters(&self) -> Result<Vec<Filter>, FilterError> {
        parse_filters(&self.default_filters)
    }

    pub fn max_lock_time(&self) -> Duration {
        Duration::from_millis(self.max_lock_time_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings =
            ServerSettings::from_json(r#"{"serverName": "printer", "maxLockTimeMs": 100}"#)
                .unwrap();

        assert_eq!(settings.server_name, "printer");
        assert_eq!(settings.max_lock_time(), Duration::from_millis(100));
        assert_eq!(settings.bind_address, ServerSettings::default().bind_address);
    }

    #[test]
    fn test_invalid_json() {
        let err = ServerSettings::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidData(_)));

        let err = ServerSettings::from_json(r#"{"maxLockTimeMs": "soon"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidData(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("dsf-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("config.json");

        let missing = ServerSettings::load(dir.join("missing.json")).unwrap();
        assert_eq!(missing, ServerSettings::default());

        std::fs::write(&file, r#"{"defaultFilters": "state.status, move/axes[*]/**"}"#).unwrap();
        let settings = ServerSettings::load(&file).unwrap();
        let filters = settings.default_filters().unwrap();
        let raw: Vec<&str> = filters.iter().map(Filter::as_str).collect();
        assert_eq!(raw, vec!["state.status", "move/axes[*]/**"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_serialize_camel_case() {
        let json = serde_json::to_value(ServerSettings::default()).unwrap();
        assert_eq!(json["maxLockTimeMs"], 250);
        assert_eq!(json["bindAddress"], "127.0.0.1:9888");
    }
}
