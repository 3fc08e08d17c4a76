use inkwell_ot::ResolutionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "inkwell.config.json";

/// Session configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Order used when folding a batch and resolving pairs
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,

    /// Command buffer per document actor
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Update buffer per subscriber
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Collect operations for this long before folding them (0 = fold on submit)
    #[serde(default)]
    pub batch_window_ms: u64,

    /// Applied versions kept for rebasing operations written against older content
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Compare against the recorded expected state after each flush
    #[serde(default = "default_verify_after_flush")]
    pub verify_after_flush: bool,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_subscriber_capacity() -> usize {
    64
}

fn default_history_limit() -> usize {
    1024
}

fn default_verify_after_flush() -> bool {
    true
}

impl SessionConfig {
    /// Load config from a directory, falling back to defaults
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            Self::from_path(&config_path)
        } else {
            Ok(SessionConfig::default())
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// `None` when every submit folds immediately
    pub fn batch_window(&self) -> Option<Duration> {
        (self.batch_window_ms > 0).then(|| Duration::from_millis(self.batch_window_ms))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_strategy: ResolutionStrategy::default(),
            channel_capacity: default_channel_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            batch_window_ms: 0,
            history_limit: default_history_limit(),
            verify_after_flush: default_verify_after_flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "defaultStrategy": "user_priority",
            "batchWindowMs": 50
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.default_strategy, ResolutionStrategy::UserPriority);
        assert_eq!(config.batch_window(), Some(Duration::from_millis(50)));
        assert_eq!(config.channel_capacity, 256);
        assert_eq!(config.history_limit, 1024);
        assert!(config.verify_after_flush);
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.default_strategy, ResolutionStrategy::TimestampPriority);
        assert_eq!(config.batch_window(), None);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(SessionConfig::load(dir.path()).unwrap(), SessionConfig::default());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "subscriberCapacity": 8, "verifyAfterFlush": false }"#,
        )
        .unwrap();
        let config = SessionConfig::load(dir.path()).unwrap();
        assert_eq!(config.subscriber_capacity, 8);
        assert!(!config.verify_after_flush);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ not json").unwrap();
        assert!(SessionConfig::load(dir.path()).is_err());
    }
}
