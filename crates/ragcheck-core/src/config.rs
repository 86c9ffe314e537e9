//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! max_concurrency = 8
//! channel_capacity = 64
//! item_timeout_ms = 30000
//! run_deadline_ms = 600000
//! bleu_max_order = 4
//! task_write_retries = 3
//! retry_backoff_ms = 50
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on runner calls in flight for one run.
    pub max_concurrency: usize,
    /// Buffer between item workers and the aggregator.
    pub channel_capacity: usize,
    /// Per-item runner timeout. `None` waits indefinitely.
    pub item_timeout_ms: Option<u64>,
    /// Wall-clock budget for a whole run, measured from when it starts running.
    pub run_deadline_ms: Option<u64>,
    /// Highest n-gram order used by BLEU.
    pub bleu_max_order: usize,
    /// Extra attempts for a failed task-row write before the run is aborted.
    pub task_write_retries: u32,
    /// Delay between task-row write attempts (multiplied by the attempt number).
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            channel_capacity: 64,
            item_timeout_ms: None,
            run_deadline_ms: None,
            bleu_max_order: 4,
            task_write_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be at least 1".into()));
        }
        if self.bleu_max_order == 0 {
            return Err(ConfigError::Invalid("bleu_max_order must be at least 1".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    #[must_use]
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_ms.map(Duration::from_millis)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_ms.map(Duration::from_millis)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
