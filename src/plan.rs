//! Update plan construction.
//!
//! Replicas are sorted least critical first (by [`RolePriority`], ties broken
//! by ordinal) and grouped into ordered [`Batch`]es according to the
//! component's [`UpdateStrategy`]. Plans are cheap, deterministic for a given
//! observation set, and rebuilt on every pass.

use crate::role::{RoleMap, RolePriority};
use crate::types::{ReplicaObservation, UpdateStrategy};

/// Replicas replaced together within one walk step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch<'a> {
    replicas: Vec<&'a ReplicaObservation>,
}

impl<'a> Batch<'a> {
    pub fn new(replicas: Vec<&'a ReplicaObservation>) -> Self {
        Self { replicas }
    }

    pub fn replicas(&self) -> &[&'a ReplicaObservation] {
        &self.replicas
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.replicas.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

/// Ordered batches of one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan<'a> {
    batches: Vec<Batch<'a>>,
}

impl<'a> Plan<'a> {
    /// Plan over `batches`, dropping empty ones.
    pub fn new(batches: impl IntoIterator<Item = Batch<'a>>) -> Self {
        Self {
            batches: batches.into_iter().filter(|b| !b.is_empty()).collect(),
        }
    }

    pub fn batches(&self) -> &[Batch<'a>] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn replica_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Sort replicas least critical first, ties by ascending ordinal.
pub fn sort_replicas<'a>(
    replicas: &'a [ReplicaObservation],
    roles: &RoleMap,
) -> Vec<&'a ReplicaObservation> {
    let mut sorted: Vec<_> = replicas.iter().collect();
    sorted.sort_by_key(|r| (roles.priority(&r.role_label), r.ordinal));
    sorted
}

/// Build the update plan for `replicas` under `strategy`.
pub fn build_plan<'a>(
    replicas: &'a [ReplicaObservation],
    roles: &RoleMap,
    strategy: UpdateStrategy,
) -> Plan<'a> {
    let sorted = sort_replicas(replicas, roles);

    match strategy {
        UpdateStrategy::Serial => Plan::new(serial_batches(&sorted)),
        UpdateStrategy::Parallel => Plan::new(parallel_batches(&sorted)),
        UpdateStrategy::BestEffortParallel => {
            Plan::new(best_effort_parallel_batches(&sorted, roles))
        }
    }
}

/// One replica per batch.
pub fn serial_batches<'a>(sorted: &[&'a ReplicaObservation]) -> Vec<Batch<'a>> {
    sorted.iter().map(|r| Batch::new(vec![*r])).collect()
}

/// A single batch with every replica.
pub fn parallel_batches<'a>(sorted: &[&'a ReplicaObservation]) -> Vec<Batch<'a>> {
    vec![Batch::new(sorted.to_vec())]
}

/// Learners and below, first half of the followers, second half, leaders.
///
/// Always returns the four groups in that order, empty ones included. With
/// `F` followers the follower groups hold `F / 2` and `F - F / 2` replicas.
pub fn best_effort_parallel_batches<'a>(
    sorted: &[&'a ReplicaObservation],
    roles: &RoleMap,
) -> [Batch<'a>; 4] {
    let priority = |r: &ReplicaObservation| roles.priority(&r.role_label);

    let learners_end = sorted.partition_point(|r| priority(*r) <= RolePriority::Learner);
    let (learners, rest) = sorted.split_at(learners_end);

    let followers = rest
        .iter()
        .filter(|r| priority(**r) < RolePriority::Leader)
        .count();
    let half = followers / 2;

    [
        Batch::new(learners.to_vec()),
        Batch::new(rest[..half].to_vec()),
        Batch::new(rest[half..followers].to_vec()),
        Batch::new(rest[followers..].to_vec()),
    ]
}
