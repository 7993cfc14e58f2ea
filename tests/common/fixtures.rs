// Test fixtures and data generators for integration tests

use consensus_rollout::{
    AccessMode, ComponentRef, ComponentRoleSpec, ReplicaObservation, RoleSpec, UpdateStrategy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Role labels used by [`mysql_roles`].
pub const LEADER: &str = "leader";
pub const FOLLOWER: &str = "follower";
pub const READER: &str = "reader";
pub const LEARNER: &str = "learner";

/// A leader, read-write and read-only followers, and a learner.
pub fn mysql_roles(strategy: UpdateStrategy) -> ComponentRoleSpec {
    ComponentRoleSpec {
        leader: Some(RoleSpec::new(LEADER, AccessMode::ReadWrite)),
        followers: vec![
            RoleSpec::new(FOLLOWER, AccessMode::ReadWrite),
            RoleSpec::new(READER, AccessMode::Readonly),
        ],
        learner: Some(RoleSpec::new(LEARNER, AccessMode::None)),
        update_strategy: strategy,
    }
}

pub fn component() -> ComponentRef {
    ComponentRef::new("default", "mysql-cluster", "mysql")
}

/// Ready replica `mysql-<ordinal>` at `revision`.
pub fn replica(ordinal: usize, role: &str, revision: &str) -> ReplicaObservation {
    ReplicaObservation::new(format!("mysql-{}", ordinal))
        .with_role(role)
        .with_revision(revision)
        .ready(true)
}

/// Deterministic random observation sets for reproducible tests
pub struct ObservationGenerator {
    rng: StdRng,
}

impl ObservationGenerator {
    /// Creates a new generator with a fixed seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Random role label, including empty and undefined ones.
    pub fn role(&mut self) -> &'static str {
        const LABELS: [&str; 6] = [LEADER, FOLLOWER, READER, LEARNER, "", "witness"];
        LABELS[self.rng.gen_range(0..LABELS.len())]
    }

    /// `count` replicas with random roles, revisions and readiness.
    pub fn replicas(&mut self, count: usize) -> Vec<ReplicaObservation> {
        (0..count)
            .map(|ordinal| {
                let role = self.role();
                let revision = if self.rng.gen_bool(0.5) { "rev-1" } else { "rev-2" };
                replica(ordinal, role, revision).ready(self.rng.gen_bool(0.8))
            })
            .collect()
    }
}
