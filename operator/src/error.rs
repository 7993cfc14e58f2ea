//! Error types for the rollout operator

use consensus_rollout::RolloutError;
use thiserror::Error;

/// Main error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Rollout error: {0}")]
    Rollout(#[from] RolloutError),

    #[error("CRD not installed. Please install the ConsensusComponent CRD first.")]
    CrdNotInstalled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    /// The workload cannot be mapped to a pod selector.
    #[error("Invalid workload {name}: {reason}")]
    InvalidWorkload { name: String, reason: String },
}

impl Error {
    /// The status write lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Rollout(e) => e.is_conflict(),
            Error::Kube(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }

    /// Label value for the error counter.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::Rollout(RolloutError::Conflict(_)) => "conflict",
            Error::Rollout(RolloutError::DeleteFailed { .. }) => "delete",
            Error::Rollout(RolloutError::Propagation(_)) => "propagation",
            Error::Rollout(_) => "rollout",
            Error::CrdNotInstalled | Error::InvalidConfig(_) => "config",
            Error::WorkloadNotFound(_) | Error::InvalidWorkload { .. } => "workload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let err = Error::from(RolloutError::Conflict("default/db/mysql".into()));
        assert!(err.is_conflict());
        assert_eq!(err.metric_label(), "conflict");

        let err = Error::WorkloadNotFound("default/db".into());
        assert!(!err.is_conflict());
        assert_eq!(err.metric_label(), "workload");
    }

    #[test]
    fn test_metric_labels() {
        let err = Error::from(RolloutError::Propagation("default/db/mysql: rejected".into()));
        assert_eq!(err.metric_label(), "propagation");

        let err = Error::InvalidWorkload {
            name: "mysql".into(),
            reason: "no selector".into(),
        };
        assert_eq!(err.metric_label(), "workload");
        assert_eq!(Error::CrdNotInstalled.metric_label(), "config");
    }
}
