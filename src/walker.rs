//! Plan execution.
//!
//! [`walk_one_step`] evaluates a [`Plan`] from its first batch and stops at
//! the first batch that has not settled, deleting stale replicas in that batch
//! so the workload controller recreates them at the target revision. Nothing
//! is remembered between calls: batches that already caught up settle
//! immediately and are skipped within the same call.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::plan::Plan;
use crate::types::ReplicaObservation;

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The replica no longer existed.
    AlreadyGone,
}

/// Deletes replicas so they are recreated at the target revision.
#[async_trait]
pub trait ReplicaDeleter: Send + Sync {
    /// Request deletion without waiting for it to finish.
    ///
    /// A replica that is already gone is [`DeleteOutcome::AlreadyGone`], not
    /// an error.
    async fn delete_replica(&self, replica: &ReplicaObservation) -> Result<DeleteOutcome>;
}

/// Where a replica stands relative to the target revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// At the target revision and ready.
    Settled,
    /// Going away; its replacement is not up yet.
    Terminating,
    /// At the target revision but not ready yet.
    AwaitingReady,
    /// Behind the target revision; needs replacing.
    Stale,
}

impl Settlement {
    pub fn is_settled(&self) -> bool {
        matches!(self, Settlement::Settled)
    }
}

pub fn settle(replica: &ReplicaObservation, target_revision: &str) -> Settlement {
    if replica.terminating {
        Settlement::Terminating
    } else if replica.revision == target_revision {
        if replica.ready {
            Settlement::Settled
        } else {
            Settlement::AwaitingReady
        }
    } else {
        Settlement::Stale
    }
}

/// Result of one walk over a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Every batch settled.
    pub complete: bool,
    /// Index of the batch the walk stopped at, `None` when complete.
    pub current_batch: Option<usize>,
    pub total_batches: usize,
    /// Replicas deleted during this walk.
    pub deleted: Vec<String>,
}

/// Advance `plan` by at most one unsettled batch.
pub async fn walk_one_step(
    plan: &Plan<'_>,
    target_revision: &str,
    deleter: &dyn ReplicaDeleter,
) -> Result<WalkOutcome> {
    let mut outcome = WalkOutcome {
        total_batches: plan.len(),
        ..Default::default()
    };

    for (index, batch) in plan.batches().iter().enumerate() {
        let mut settled = true;

        for replica in batch.replicas() {
            let state = settle(replica, target_revision);
            if state == Settlement::Stale {
                match delete(deleter, replica).await? {
                    DeleteOutcome::Deleted => outcome.deleted.push(replica.name.clone()),
                    DeleteOutcome::AlreadyGone => {
                        debug!(replica = %replica.name, "Replica already gone")
                    }
                }
            }
            settled &= state.is_settled();
        }

        if !settled {
            debug!(
                batch = index,
                total = plan.len(),
                deleted = outcome.deleted.len(),
                "Waiting for batch to settle"
            );
            outcome.current_batch = Some(index);
            return Ok(outcome);
        }
    }

    outcome.complete = true;
    Ok(outcome)
}

async fn delete(deleter: &dyn ReplicaDeleter, replica: &ReplicaObservation) -> Result<DeleteOutcome> {
    match deleter.delete_replica(replica).await {
        Ok(outcome) => {
            if outcome == DeleteOutcome::Deleted {
                info!(
                    replica = %replica.name,
                    revision = %replica.revision,
                    "Deleted stale replica"
                );
            }
            Ok(outcome)
        }
        Err(e) if e.is_not_found() => Ok(DeleteOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}
