//! Core types shared by the rollout components.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role name used when no leader role is named.
pub const DEFAULT_LEADER_NAME: &str = "leader";

/// Replica name held by the leader slot while no ready replica leads.
pub const PLACEHOLDER_REPLICA: &str = "Unknown";

/// Capability granted to a role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
pub enum AccessMode {
    #[default]
    None,
    Readonly,
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::None => "None",
            AccessMode::Readonly => "Readonly",
            AccessMode::ReadWrite => "ReadWrite",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which replicas of a component are replaced during an update.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
pub enum UpdateStrategy {
    /// One replica at a time, least critical role first, leader last.
    #[default]
    Serial,
    /// Every replica at once.
    Parallel,
    /// Learners, then half the followers, then the other half, then the leader.
    BestEffortParallel,
}

/// A logical role a replica may report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Value of the role label carried by replicas in this role.
    pub name: String,
    /// Access granted to replicas in this role.
    #[serde(default)]
    pub access_mode: AccessMode,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, access_mode: AccessMode) -> Self {
        Self {
            name: name.into(),
            access_mode,
        }
    }

    fn default_leader() -> Self {
        Self::new(DEFAULT_LEADER_NAME, AccessMode::ReadWrite)
    }
}

/// Role layout and update strategy of one component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRoleSpec {
    /// The single writer role. Absent or unnamed means [`DEFAULT_LEADER_NAME`].
    #[serde(default)]
    pub leader: Option<RoleSpec>,
    #[serde(default)]
    pub followers: Vec<RoleSpec>,
    #[serde(default)]
    pub learner: Option<RoleSpec>,
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
}

impl ComponentRoleSpec {
    /// The leader role, synthesized when missing so classification never fails.
    pub fn leader_or_default(&self) -> RoleSpec {
        match &self.leader {
            Some(leader) if !leader.name.is_empty() => leader.clone(),
            _ => RoleSpec::default_leader(),
        }
    }
}

/// One replica as seen during the current pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaObservation {
    pub name: String,
    /// Position within the replica set; `None` if the name carries no ordinal.
    pub ordinal: Option<u32>,
    /// Observed role label, empty if the replica has not reported one.
    pub role_label: String,
    /// Revision of the desired state that produced this replica.
    pub revision: String,
    pub ready: bool,
    pub terminating: bool,
}

impl ReplicaObservation {
    /// Observation with the ordinal parsed from the replica name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            ordinal: parse_ordinal(&name),
            name,
            role_label: String::new(),
            revision: String::new(),
            ready: false,
            terminating: false,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role_label = role.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    pub fn terminating(mut self, terminating: bool) -> Self {
        self.terminating = terminating;
        self
    }
}

/// Parse the trailing `-<n>` ordinal of a replica name.
pub fn parse_ordinal(name: &str) -> Option<u32> {
    let (_, suffix) = name.rsplit_once('-')?;
    suffix.parse().ok()
}

/// A replica holding a role in the consensus status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub replica_name: String,
    pub logical_role_name: String,
    #[serde(default)]
    pub access_mode: AccessMode,
}

impl Member {
    fn placeholder() -> Self {
        Self {
            replica_name: PLACEHOLDER_REPLICA.to_string(),
            logical_role_name: String::new(),
            access_mode: AccessMode::None,
        }
    }
}

/// Persisted record of which replica holds which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusStatus {
    pub leader: Member,
    /// Sorted by replica name, unique.
    #[serde(default)]
    pub followers: Vec<Member>,
    #[serde(default)]
    pub learner: Option<Member>,
}

impl Default for ConsensusStatus {
    fn default() -> Self {
        Self {
            leader: Member::placeholder(),
            followers: Vec::new(),
            learner: None,
        }
    }
}

impl ConsensusStatus {
    /// Name of the leading replica, if a ready replica leads.
    pub fn leader_replica(&self) -> Option<&str> {
        if self.leader.replica_name == PLACEHOLDER_REPLICA {
            None
        } else {
            Some(&self.leader.replica_name)
        }
    }

    pub fn follower_replicas(&self) -> impl Iterator<Item = &str> {
        self.followers.iter().map(|m| m.replica_name.as_str())
    }

    /// Clear every slot that references `replica`.
    pub fn release(&mut self, replica: &str) {
        if self.leader.replica_name == replica {
            self.leader = Member::placeholder();
        }
        self.followers.retain(|m| m.replica_name != replica);
        if self
            .learner
            .as_ref()
            .is_some_and(|m| m.replica_name == replica)
        {
            self.learner = None;
        }
    }
}

/// Identity of a reconciled component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    pub namespace: String,
    /// Name of the object owning the component.
    pub name: String,
    /// Component name, used for config keys.
    pub component: String,
}

impl ComponentRef {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            component: component.into(),
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.component)
    }
}
