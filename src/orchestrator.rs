//! One reconcile pass over a consensus component.
//!
//! A pass classifies roles, syncs the consensus status, and, once the
//! workload controller has converged on its own spec, advances the update
//! plan by at most one batch. Every input is observed fresh; nothing from an
//! earlier pass is reused, so a pass can be retried or abandoned at any point.

use std::fmt;

use tracing::{debug, info};

use crate::config::RolloutConfig;
use crate::error::Result;
use crate::plan::build_plan;
use crate::propagate::{ConfigPropagator, ConfigStore};
use crate::role::RoleMap;
use crate::status::{StatusReconciler, StatusStore};
use crate::types::{ComponentRef, ComponentRoleSpec, ConsensusStatus, ReplicaObservation};
use crate::walker::{walk_one_step, ReplicaDeleter};

/// What the workload controller reports about its own progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadState {
    pub desired_replicas: usize,
    pub generation: Option<i64>,
    pub observed_generation: Option<i64>,
    /// Revision new replicas are created at.
    pub update_revision: Option<String>,
}

/// Why an update plan was not built this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The workload controller has not processed the latest spec.
    GenerationPending {
        generation: Option<i64>,
        observed: Option<i64>,
    },
    /// Not every desired replica exists yet.
    ReplicasMissing { desired: usize, observed: usize },
    /// The workload has not published an update revision.
    RevisionUnknown,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::GenerationPending {
                generation,
                observed,
            } => write!(
                f,
                "generation {} not yet observed (observed {})",
                generation.unwrap_or_default(),
                observed.unwrap_or_default()
            ),
            NotReadyReason::ReplicasMissing { desired, observed } => {
                write!(f, "{}/{} replicas present", observed, desired)
            }
            NotReadyReason::RevisionUnknown => f.write_str("update revision unknown"),
        }
    }
}

impl WorkloadState {
    /// The target revision, if the workload has converged on its spec with
    /// `observed` replicas present.
    pub fn target_revision(&self, observed: usize) -> std::result::Result<&str, NotReadyReason> {
        if self.generation != self.observed_generation {
            return Err(NotReadyReason::GenerationPending {
                generation: self.generation,
                observed: self.observed_generation,
            });
        }
        if observed != self.desired_replicas {
            return Err(NotReadyReason::ReplicasMissing {
                desired: self.desired_replicas,
                observed,
            });
        }
        self.update_revision
            .as_deref()
            .ok_or(NotReadyReason::RevisionUnknown)
    }
}

/// Everything a pass needs, fetched fresh by the caller.
#[derive(Debug, Clone)]
pub struct PassInput {
    pub component: ComponentRef,
    pub role_spec: ComponentRoleSpec,
    pub replicas: Vec<ReplicaObservation>,
    pub previous_status: Option<ConsensusStatus>,
    /// Version of the record `previous_status` was read from.
    pub base_version: Option<String>,
    pub workload: WorkloadState,
}

/// State of the rolling update after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutProgress {
    /// The plan was not built.
    NotReady(NotReadyReason),
    /// A batch has not settled yet.
    InProgress {
        current_batch: usize,
        total_batches: usize,
        deleted: Vec<String>,
    },
    /// Every replica runs the target revision and is ready.
    Complete,
}

impl RolloutProgress {
    pub fn is_complete(&self) -> bool {
        matches!(self, RolloutProgress::Complete)
    }
}

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub status: ConsensusStatus,
    pub status_changed: bool,
    pub progress: RolloutProgress,
}

/// Runs reconcile passes against caller-supplied stores.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    propagator: ConfigPropagator,
}

impl Orchestrator {
    pub fn new(config: &RolloutConfig) -> Self {
        Self {
            propagator: ConfigPropagator::new(config.env_key_prefix.clone()),
        }
    }

    pub fn propagator(&self) -> &ConfigPropagator {
        &self.propagator
    }

    /// Run one pass. Errors leave nothing half-applied that a fresh pass
    /// would not redo.
    pub async fn reconcile_pass(
        &self,
        input: &PassInput,
        status_store: &dyn StatusStore,
        config_store: &dyn ConfigStore,
        deleter: &dyn ReplicaDeleter,
    ) -> Result<PassOutcome> {
        let component = &input.component;
        let roles = RoleMap::classify(&input.role_spec);

        let diff = StatusReconciler::new(status_store, config_store, &self.propagator)
            .sync(
                component,
                input.previous_status.as_ref(),
                input.base_version.as_deref(),
                &roles,
                &input.replicas,
            )
            .await?;

        let target = match input.workload.target_revision(input.replicas.len()) {
            Ok(target) => target,
            Err(reason) => {
                debug!(component = %component, %reason, "Workload not converged, deferring update");
                return Ok(PassOutcome {
                    status: diff.status,
                    status_changed: diff.changed,
                    progress: RolloutProgress::NotReady(reason),
                });
            }
        };

        let plan = build_plan(&input.replicas, &roles, input.role_spec.update_strategy);
        let walk = walk_one_step(&plan, target, deleter).await?;

        let progress = match walk.current_batch {
            None => RolloutProgress::Complete,
            Some(current_batch) => {
                info!(
                    component = %component,
                    strategy = ?input.role_spec.update_strategy,
                    batch = current_batch + 1,
                    batches = walk.total_batches,
                    deleted = ?walk.deleted,
                    target_revision = %target,
                    "Rolling update in progress"
                );
                RolloutProgress::InProgress {
                    current_batch,
                    total_batches: walk.total_batches,
                    deleted: walk.deleted,
                }
            }
        };

        Ok(PassOutcome {
            status: diff.status,
            status_changed: diff.changed,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> WorkloadState {
        WorkloadState {
            desired_replicas: 3,
            generation: Some(4),
            observed_generation: Some(4),
            update_revision: Some("rev-2".to_string()),
        }
    }

    #[test]
    fn test_target_revision_when_converged() {
        assert_eq!(workload().target_revision(3), Ok("rev-2"));
    }

    #[test]
    fn test_generation_pending() {
        let state = WorkloadState {
            observed_generation: Some(3),
            ..workload()
        };

        let reason = state.target_revision(3).unwrap_err();

        assert!(matches!(reason, NotReadyReason::GenerationPending { .. }));
        assert_eq!(reason.to_string(), "generation 4 not yet observed (observed 3)");
    }

    #[test]
    fn test_replicas_missing() {
        let reason = workload().target_revision(2).unwrap_err();

        assert_eq!(
            reason,
            NotReadyReason::ReplicasMissing {
                desired: 3,
                observed: 2
            }
        );
        assert_eq!(reason.to_string(), "2/3 replicas present");
    }

    #[test]
    fn test_revision_unknown() {
        let state = WorkloadState {
            update_revision: None,
            ..workload()
        };

        assert_eq!(state.target_revision(3), Err(NotReadyReason::RevisionUnknown));
    }
}
