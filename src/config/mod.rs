//! Configuration for rollout reconciliation.

use crate::error::{Result, RolloutError};
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings shared by every reconcile pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Components reconciled concurrently.
    pub max_concurrent_reconciles: usize,
    /// Delay before re-checking a rollout that is not ready or not complete.
    #[serde(with = "humantime_serde")]
    pub recheck_interval: Duration,
    /// Delay before re-checking a component whose rollout is complete.
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,
    /// Backoff applied to failed passes.
    pub retry: RetryConfig,
    /// Prepended to `<COMPONENT>_LEADER` and `<COMPONENT>_FOLLOWERS`.
    pub env_key_prefix: String,
    /// Field manager recorded on every patch.
    pub field_manager: String,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_concurrency(),
            recheck_interval: Duration::from_secs(1),
            resync_interval: Duration::from_secs(300),
            retry: RetryConfig::default(),
            env_key_prefix: String::new(),
            field_manager: "consensus-rollout-operator".to_string(),
        }
    }
}

/// Twice the available processors.
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

impl RolloutConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RolloutError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RolloutError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_reconciles == 0
            || self.max_concurrent_reconciles > u16::MAX as usize
        {
            return Err(invalid(
                "max_concurrent_reconciles",
                format!("must be between 1 and {}", u16::MAX),
            ));
        }

        if self.recheck_interval.is_zero() {
            return Err(invalid("recheck_interval", "must be non-zero"));
        }

        if self.resync_interval < self.recheck_interval {
            return Err(invalid(
                "resync_interval",
                "must not be shorter than recheck_interval",
            ));
        }

        if !(self.retry.multiplier >= 1.0 && self.retry.multiplier.is_finite()) {
            return Err(invalid("retry.multiplier", "must be a finite value >= 1"));
        }

        if self.retry.initial_delay > self.retry.max_delay {
            return Err(invalid(
                "retry.initial_delay",
                "must not exceed retry.max_delay",
            ));
        }

        if self.field_manager.is_empty() {
            return Err(invalid("field_manager", "must not be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> RolloutError {
    RolloutError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}
