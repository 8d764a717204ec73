//! Runtime configuration for a survey session

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a survey session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SurveyConfig {
    /// Preview mode: validate only, never persist or transmit
    pub designer_mode: bool,

    /// Upper bound on every storage call
    pub storage_timeout_ms: u64,

    /// Upper bound on every transport send
    pub transport_timeout_ms: u64,

    /// Key prefix of queued responses
    pub response_prefix: String,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            designer_mode: false,
            storage_timeout_ms: 5_000,
            transport_timeout_ms: 15_000,
            response_prefix: "response".to_string(),
        }
    }
}

impl SurveyConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(std::io::Error::from)
    }

    /// A preview configuration
    pub fn designer() -> Self {
        Self {
            designer_mode: true,
            ..Self::default()
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SurveyConfig::from_json(r#"{"storage-timeout-ms": 250}"#).unwrap();
        assert_eq!(config.storage_timeout(), Duration::from_millis(250));
        assert_eq!(config.transport_timeout(), Duration::from_secs(15));
        assert_eq!(config.response_prefix, "response");
        assert!(!config.designer_mode);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.json");
        std::fs::write(&path, r#"{"designer-mode": true}"#).unwrap();
        assert_eq!(SurveyConfig::from_file(&path).unwrap(), SurveyConfig::designer());
    }
}
