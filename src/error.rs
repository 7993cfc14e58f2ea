//! Error types for consensus rollouts.
//!
//! Every failure the core can produce is retryable by recomputing the pass
//! from fresh observations. The classifiers on [`RolloutError`] let callers
//! pick between a backoff retry and an immediate one.
//!
//! # Example
//!
//! ```rust
//! use consensus_rollout::error::RolloutError;
//!
//! let err = RolloutError::Conflict("default/mysql".into());
//! assert!(err.is_conflict());
//! assert!(err.is_retryable());
//! ```

use thiserror::Error;

/// Main error type for rollout operations.
#[derive(Error, Debug)]
pub enum RolloutError {
    /// The persisted status changed since it was read.
    #[error("Status write conflict for {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Fetch, list or patch failure in a backing store.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Replica deletion failed for {replica}: {reason}")]
    DeleteFailed { replica: String, reason: String },

    #[error("Config propagation failed: {0}")]
    Propagation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl RolloutError {
    /// Whether a later pass with fresh inputs can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RolloutError::Conflict(_)
                | RolloutError::NotFound(_)
                | RolloutError::Store(_)
                | RolloutError::DeleteFailed { .. }
                | RolloutError::Propagation(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RolloutError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RolloutError::NotFound(_))
    }
}

/// Result type alias for rollout operations.
pub type Result<T> = std::result::Result<T, RolloutError>;
