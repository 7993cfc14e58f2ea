//! Retry backoff for failed reconcile passes.
//!
//! A failed pass is never retried in place; the caller schedules a fresh pass
//! after the delay computed here. [`BackoffTracker`] keeps the per-object
//! attempt count that turns consecutive failures into growing delays.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Quick retry configuration.
    pub fn quick() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Calculate delay for a given attempt, starting at 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::from_secs_f64(base_delay.min(self.max_delay.as_secs_f64()));

        if self.jitter {
            let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
        } else {
            delay
        }
    }
}

/// Consecutive failure counts per key.
pub struct BackoffTracker<K> {
    config: RetryConfig,
    attempts: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash> BackoffTracker<K> {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `key` and return the delay before its next pass.
    pub fn next_delay(&self, key: K) -> Duration {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(key).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        self.config.delay_for_attempt(attempt)
    }

    /// Forget the failures of `key` after a successful pass or once the
    /// object is gone.
    pub fn reset(&self, key: &K) {
        self.attempts.lock().remove(key);
    }

    pub fn attempts(&self, key: &K) -> u32 {
        self.attempts.lock().get(key).copied().unwrap_or(0)
    }
}
