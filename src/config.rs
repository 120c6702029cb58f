//! Orchestrator-wide tunables, loadable from TOML or built programmatically.
//!
//! `Config::default()` reproduces the timing constants implied by the
//! hard-coded base behavior (100ms reconciliation, 5 catalog retries with a
//! 1s backoff, 1s start timeouts) so embedders only need to touch this when
//! they actually want something different.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_max_runners() -> usize {
    4
}

fn default_reconciliation_interval_ms() -> u64 {
    100
}

fn default_catalog_retry_attempts() -> usize {
    5
}

fn default_catalog_retry_backoff_ms() -> u64 {
    1_000
}

fn default_handler_pool_workers() -> usize {
    0
}

fn default_scheduler_start_timeout_ms() -> u64 {
    1_000
}

fn default_dispatcher_start_timeout_ms() -> u64 {
    1_000
}

fn default_result_retention() -> usize {
    1_000
}

/// Orchestrator-wide tunables. Every field has a default; construct with
/// [`Config::default`] and override via the `with_*` builders, or load a
/// whole document with [`Config::from_toml_str`] / [`Config::from_toml_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_max_runners")]
    pub max_runners: usize,
    #[serde(default = "default_reconciliation_interval_ms")]
    pub reconciliation_interval_ms: u64,
    #[serde(default = "default_catalog_retry_attempts")]
    pub catalog_retry_attempts: usize,
    #[serde(default = "default_catalog_retry_backoff_ms")]
    pub catalog_retry_backoff_ms: u64,
    /// Default worker count for auto-registered handler pools; `0` falls
    /// back to the available-parallelism count, mirroring `HandlerPool::new`.
    #[serde(default = "default_handler_pool_workers")]
    pub default_handler_pool_workers: usize,
    #[serde(default = "default_scheduler_start_timeout_ms")]
    pub scheduler_start_timeout_ms: u64,
    #[serde(default = "default_dispatcher_start_timeout_ms")]
    pub dispatcher_start_timeout_ms: u64,
    #[serde(default = "default_result_retention")]
    pub result_retention: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_runners: default_max_runners(),
            reconciliation_interval_ms: default_reconciliation_interval_ms(),
            catalog_retry_attempts: default_catalog_retry_attempts(),
            catalog_retry_backoff_ms: default_catalog_retry_backoff_ms(),
            default_handler_pool_workers: default_handler_pool_workers(),
            scheduler_start_timeout_ms: default_scheduler_start_timeout_ms(),
            dispatcher_start_timeout_ms: default_dispatcher_start_timeout_ms(),
            result_retention: default_result_retention(),
        }
    }
}

impl Config {
    /// Parses a TOML document into a `Config`, then validates it.
    pub fn from_toml_str(s: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file into a `Config`, then validates it.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Parse(format!("reading {}: {e}", path.as_ref().display())))?;
        Config::from_toml_str(&raw)
    }

    pub fn with_max_runners(mut self, n: usize) -> Config {
        self.max_runners = n;
        self
    }

    pub fn with_reconciliation_interval(mut self, d: Duration) -> Config {
        self.reconciliation_interval_ms = d.as_millis() as u64;
        self
    }

    pub fn with_catalog_retry(mut self, attempts: usize, backoff: Duration) -> Config {
        self.catalog_retry_attempts = attempts;
        self.catalog_retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }

    pub fn catalog_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.catalog_retry_backoff_ms)
    }

    pub fn scheduler_start_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler_start_timeout_ms)
    }

    pub fn dispatcher_start_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatcher_start_timeout_ms)
    }

    /// Rejects a config with structurally nonsensical tunables: a zero
    /// runner count, or a zero-length reconciliation interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_runners == 0 {
            return Err(ConfigError::Invalid("max_runners must be >= 1".to_owned()));
        }
        if self.reconciliation_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation_interval_ms must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_base_spec_constants() {
        let config = Config::default();
        assert_eq!(config.max_runners, 4);
        assert_eq!(config.reconciliation_interval_ms, 100);
        assert_eq!(config.catalog_retry_attempts, 5);
        assert_eq!(config.catalog_retry_backoff_ms, 1_000);
        assert_eq!(config.scheduler_start_timeout_ms, 1_000);
        assert_eq!(config.dispatcher_start_timeout_ms, 1_000);
    }

    #[test]
    fn partial_toml_document_fills_in_defaults() {
        let config = Config::from_toml_str("max_runners = 8\n").unwrap();
        assert_eq!(config.max_runners, 8);
        assert_eq!(config.reconciliation_interval_ms, 100);
    }

    #[test]
    fn zero_max_runners_fails_validation() {
        let config = Config::default().with_max_runners(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml_str("max_runners = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
