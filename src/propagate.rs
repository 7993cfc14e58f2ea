//! Propagation of leader and follower identities to config records.
//!
//! Workloads read `<COMPONENT>_LEADER` and `<COMPONENT>_FOLLOWERS` from
//! environment config records to find their peers. The values are derived
//! from the consensus status and pushed on every pass. Stores leave records
//! that already hold them untouched.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, RolloutError};
use crate::types::{ComponentRef, ConsensusStatus};

/// Config records of a component that receive role identities.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Merge `entries` into every config record of `component`.
    ///
    /// Records already holding every entry are left alone. Returns the number
    /// of records updated. A component without config records is not an
    /// error.
    async fn apply_entries(
        &self,
        component: &ComponentRef,
        entries: &BTreeMap<String, String>,
    ) -> Result<usize>;
}

/// Leader and follower identities derived from a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEnv {
    /// Leading replica, empty when no ready replica leads.
    pub leader: String,
    /// Comma-joined follower replicas in name order.
    pub followers: String,
}

impl RoleEnv {
    pub fn from_status(status: &ConsensusStatus) -> Self {
        Self {
            leader: status.leader_replica().unwrap_or_default().to_string(),
            followers: status.follower_replicas().collect::<Vec<_>>().join(","),
        }
    }
}

/// Builds config keys and pushes role identities to a [`ConfigStore`].
#[derive(Debug, Clone, Default)]
pub struct ConfigPropagator {
    key_prefix: String,
}

impl ConfigPropagator {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
        }
    }

    pub fn leader_key(&self, component: &str) -> String {
        format!("{}{}_LEADER", self.key_prefix, component.to_uppercase())
    }

    pub fn followers_key(&self, component: &str) -> String {
        format!("{}{}_FOLLOWERS", self.key_prefix, component.to_uppercase())
    }

    /// Config entries describing `status`.
    pub fn entries(&self, component: &str, status: &ConsensusStatus) -> BTreeMap<String, String> {
        let env = RoleEnv::from_status(status);
        BTreeMap::from([
            (self.leader_key(component), env.leader),
            (self.followers_key(component), env.followers),
        ])
    }

    /// Push the identities in `status` to every config record of `component`.
    pub async fn propagate(
        &self,
        store: &dyn ConfigStore,
        component: &ComponentRef,
        status: &ConsensusStatus,
    ) -> Result<usize> {
        let entries = self.entries(&component.component, status);
        let updated = store
            .apply_entries(component, &entries)
            .await
            .map_err(|e| RolloutError::Propagation(format!("{}: {}", component, e)))?;

        debug!(component = %component, records = updated, "Role identities propagated");
        Ok(updated)
    }
}
