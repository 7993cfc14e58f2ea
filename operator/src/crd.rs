//! Custom Resource Definition for consensus components

use consensus_rollout::{ComponentRoleSpec, ConsensusStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ConsensusComponent attaches a role layout and update strategy to an
/// existing StatefulSet
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "rollout.consensus.io",
    version = "v1alpha1",
    kind = "ConsensusComponent",
    plural = "consensuscomponents",
    shortname = "ccomp",
    status = "ConsensusComponentStatus",
    namespaced,
    printcolumn = r#"{"name":"Leader","type":"string","jsonPath":".status.consensusSetStatus.leader.replicaName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusComponentSpec {
    /// StatefulSet in the same namespace running the replicas
    pub workload_ref: String,

    /// Component name used for config keys, defaults to the resource name
    #[serde(default)]
    pub component_name: Option<String>,

    /// Role layout and update strategy
    #[serde(default)]
    pub roles: ComponentRoleSpec,
}

/// Observed state of a consensus component
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusComponentStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RolloutPhase,

    /// Which replica holds which role
    pub consensus_set_status: Option<ConsensusStatus>,

    /// Revision the rollout is converging on
    pub update_revision: Option<String>,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<RolloutCondition>,

    /// Observed generation
    #[serde(default)]
    pub observed_generation: i64,

    /// Message
    pub message: Option<String>,
}

/// Rollout phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum RolloutPhase {
    /// The workload has not converged on its own spec yet.
    #[default]
    Pending,
    Updating,
    Running,
}

impl RolloutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutPhase::Pending => "Pending",
            RolloutPhase::Updating => "Updating",
            RolloutPhase::Running => "Running",
        }
    }
}

/// Rollout condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RolloutCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: Option<String>,

    /// Reason
    pub reason: Option<String>,

    /// Message
    pub message: Option<String>,
}

impl ConsensusComponent {
    /// Component name used for config keys.
    pub fn component_name(&self) -> String {
        match &self.spec.component_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => kube::ResourceExt::name_any(self),
        }
    }

    /// The persisted consensus status, if one was written.
    pub fn consensus_status(&self) -> Option<&ConsensusStatus> {
        self.status
            .as_ref()
            .and_then(|s| s.consensus_set_status.as_ref())
    }
}
