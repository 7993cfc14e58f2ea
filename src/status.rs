//! Consensus status reconciliation.
//!
//! Folds the role labels of ready replicas into a [`ConsensusStatus`] and
//! reports whether it differs from the persisted one. When it does, the new
//! status is written through a [`StatusStore`]. The derived leader and
//! follower identities are then pushed to config records, which stores apply
//! only to records that do not hold them yet.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::propagate::{ConfigPropagator, ConfigStore};
use crate::role::{RoleInfo, RoleKind, RoleMap};
use crate::types::{ComponentRef, ConsensusStatus, Member, ReplicaObservation};

/// Persistence for the consensus status of a component.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Write `status` only if the stored record is still at `base_version`.
    ///
    /// Must fail with [`RolloutError::Conflict`](crate::RolloutError::Conflict)
    /// when the record moved since it was read.
    async fn write_status(
        &self,
        component: &ComponentRef,
        base_version: Option<&str>,
        status: &ConsensusStatus,
    ) -> Result<()>;
}

/// Result of folding observed roles into a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDiff {
    pub status: ConsensusStatus,
    /// Whether `status` differs from the previous record.
    pub changed: bool,
}

/// Compute the consensus status implied by the ready replicas.
///
/// The result is built from an empty status so replicas that stopped being
/// ready drop out, then compared structurally with `previous`.
pub fn reconcile_status(
    previous: Option<&ConsensusStatus>,
    roles: &RoleMap,
    replicas: &[ReplicaObservation],
) -> StatusDiff {
    let mut status = ConsensusStatus::default();

    for replica in replicas.iter().filter(|r| r.ready) {
        let Some(role) = roles.get(&replica.role_label) else {
            continue;
        };
        apply_role(&mut status, role, &replica.name);
    }

    let changed = previous != Some(&status);
    StatusDiff { status, changed }
}

/// Move `replica` into the slot for `role`, releasing any slot it held.
fn apply_role(status: &mut ConsensusStatus, role: &RoleInfo, replica: &str) {
    status.release(replica);

    let member = Member {
        replica_name: replica.to_string(),
        logical_role_name: role.name.clone(),
        access_mode: role.access_mode,
    };

    match role.kind {
        RoleKind::Leader => status.leader = member,
        RoleKind::Follower => {
            if !status.followers.iter().any(|m| m.replica_name == replica) {
                status.followers.push(member);
                status
                    .followers
                    .sort_by(|a, b| a.replica_name.cmp(&b.replica_name));
            }
        }
        RoleKind::Learner => status.learner = Some(member),
        RoleKind::Unknown => {}
    }
}

/// Persists status changes and propagates them to config records.
pub struct StatusReconciler<'a> {
    status_store: &'a dyn StatusStore,
    config_store: &'a dyn ConfigStore,
    propagator: &'a ConfigPropagator,
}

impl<'a> StatusReconciler<'a> {
    pub fn new(
        status_store: &'a dyn StatusStore,
        config_store: &'a dyn ConfigStore,
        propagator: &'a ConfigPropagator,
    ) -> Self {
        Self {
            status_store,
            config_store,
            propagator,
        }
    }

    /// Reconcile, persist and propagate the status of one component.
    ///
    /// The write is skipped when nothing changed. Propagation runs once the
    /// stored status matches the observed one, so a push that failed after
    /// the write is repeated by the next pass.
    pub async fn sync(
        &self,
        component: &ComponentRef,
        previous: Option<&ConsensusStatus>,
        base_version: Option<&str>,
        roles: &RoleMap,
        replicas: &[ReplicaObservation],
    ) -> Result<StatusDiff> {
        let diff = reconcile_status(previous, roles, replicas);
        if diff.changed {
            self.status_store
                .write_status(component, base_version, &diff.status)
                .await?;

            info!(
                component = %component,
                leader = diff.status.leader_replica().unwrap_or_default(),
                followers = diff.status.followers.len(),
                learner = diff.status.learner.is_some(),
                "Consensus status updated"
            );
        } else {
            debug!(component = %component, "Consensus status unchanged");
        }

        self.propagator
            .propagate(self.config_store, component, &diff.status)
            .await?;

        Ok(diff)
    }
}
