//! Consensus-aware rolling updates for replicated database workloads.
//!
//! A replicated set runs one leader, any number of followers with differing
//! access modes, and optionally a learner. Upgrading such a set by replacing
//! pods in arbitrary order can take away write availability or quorum, so this
//! crate orders replacements by role:
//!
//! - **Role classification**: the component's role layout becomes a closed set of
//!   role kinds with a strict priority order ([`role`]).
//! - **Status reconciliation**: observed role labels of ready replicas are
//!   folded into a persisted [`ConsensusStatus`](types::ConsensusStatus)
//!   ([`status`]), and leader/follower identities are pushed to config
//!   records when it changes ([`propagate`]).
//! - **Update plans**: replicas are grouped into ordered batches according to
//!   the selected [`UpdateStrategy`](types::UpdateStrategy) ([`plan`]).
//! - **Plan walking**: each pass advances the plan by at most one unsettled
//!   batch, deleting stale replicas so the workload controller recreates them
//!   ([`walker`]).
//!
//! Nothing is cached between passes. Progress is whatever the observations
//! say it is, which keeps every pass safe to retry or abandon.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  RoleMap ─► StatusReconciler ─► StatusStore ─► ConfigStore   │
//! │     │                                                        │
//! │     └────► UpdatePlanBuilder ─► PlanWalker ─► ReplicaDeleter │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stores and the deleter are traits; the `consensus-rollout-operator`
//! crate implements them on top of the Kubernetes API.

pub mod config;
pub mod error;
pub mod types;

pub mod orchestrator;
pub mod plan;
pub mod propagate;
pub mod resilience;
pub mod role;
pub mod status;
pub mod walker;

pub use error::{Result, RolloutError};
pub use orchestrator::{Orchestrator, PassInput, PassOutcome, RolloutProgress, WorkloadState};
pub use plan::{build_plan, Batch, Plan};
pub use role::{RoleKind, RoleMap, RolePriority};
pub use types::{
    AccessMode, ComponentRef, ComponentRoleSpec, ConsensusStatus, Member, ReplicaObservation,
    RoleSpec, UpdateStrategy,
};
pub use walker::{walk_one_step, DeleteOutcome, ReplicaDeleter, WalkOutcome};
