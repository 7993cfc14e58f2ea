//! Kubernetes implementations of the rollout collaborator traits

use std::collections::BTreeMap;

use async_trait::async_trait;
use consensus_rollout::propagate::ConfigStore;
use consensus_rollout::status::StatusStore;
use consensus_rollout::{
    ComponentRef, ConsensusStatus, DeleteOutcome, ReplicaDeleter, ReplicaObservation, Result,
    RolloutError,
};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use crate::crd::ConsensusComponent;
use crate::observe::{
    format_selector, COMPONENT_LABEL, CONFIG_TYPE_LABEL, INSTANCE_LABEL, ROLE_ENV_CONFIG,
};

fn patch_params(field_manager: &str) -> PatchParams {
    PatchParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    }
}

/// HTTP status of an API error response.
fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

fn store_error(err: kube::Error, what: &str) -> RolloutError {
    match api_code(&err) {
        Some(409) => RolloutError::Conflict(what.to_string()),
        Some(404) => RolloutError::NotFound(what.to_string()),
        _ => RolloutError::Store(format!("{}: {}", what, err)),
    }
}

/// Body of a status write conditioned on `base_version`.
pub fn status_patch(base_version: Option<&str>, status: &ConsensusStatus) -> serde_json::Value {
    let mut patch = json!({ "status": { "consensusSetStatus": status } });
    if let Some(version) = base_version {
        patch["metadata"] = json!({ "resourceVersion": version });
    }
    patch
}

/// Writes the consensus status into the ConsensusComponent status subresource.
pub struct KubeStatusStore {
    client: Client,
    field_manager: String,
}

impl KubeStatusStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl StatusStore for KubeStatusStore {
    async fn write_status(
        &self,
        component: &ComponentRef,
        base_version: Option<&str>,
        status: &ConsensusStatus,
    ) -> Result<()> {
        let api: Api<ConsensusComponent> =
            Api::namespaced(self.client.clone(), &component.namespace);
        let patch = status_patch(base_version, status);

        api.patch_status(
            &component.name,
            &patch_params(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| store_error(e, &component.to_string()))?;

        debug!(component = %component, base_version = ?base_version, "Status written");
        Ok(())
    }
}

/// Label selector for the role-env ConfigMaps of a component.
pub fn config_selector(component: &ComponentRef) -> String {
    format_selector(&BTreeMap::from([
        (INSTANCE_LABEL.to_string(), component.name.clone()),
        (COMPONENT_LABEL.to_string(), component.component.clone()),
        (CONFIG_TYPE_LABEL.to_string(), ROLE_ENV_CONFIG.to_string()),
    ]))
}

/// Whether `data` already holds every entry.
fn contains_entries(
    data: Option<&BTreeMap<String, String>>,
    entries: &BTreeMap<String, String>,
) -> bool {
    data.is_some_and(|data| entries.iter().all(|(k, v)| data.get(k) == Some(v)))
}

/// Merges role identities into the component's role-env ConfigMaps.
pub struct KubeConfigStore {
    client: Client,
    field_manager: String,
}

impl KubeConfigStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn apply_entries(
        &self,
        component: &ComponentRef,
        entries: &BTreeMap<String, String>,
    ) -> Result<usize> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &component.namespace);
        let lp = ListParams::default().labels(&config_selector(component));
        let config_maps = api
            .list(&lp)
            .await
            .map_err(|e| store_error(e, &component.to_string()))?;

        let patch = json!({ "data": entries });
        let pp = patch_params(&self.field_manager);
        let mut updated = 0;
        for cm in &config_maps.items {
            if contains_entries(cm.data.as_ref(), entries) {
                continue;
            }
            let name = cm.name_any();
            api.patch(&name, &pp, &Patch::Merge(&patch))
                .await
                .map_err(|e| store_error(e, &format!("configmap {}", name)))?;
            debug!(configmap = %name, component = %component, "Role env updated");
            updated += 1;
        }

        Ok(updated)
    }
}

/// Deletes pods so their StatefulSet recreates them at the update revision.
pub struct KubePodDeleter {
    api: Api<Pod>,
}

impl KubePodDeleter {
    pub fn new(api: Api<Pod>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ReplicaDeleter for KubePodDeleter {
    async fn delete_replica(&self, replica: &ReplicaObservation) -> Result<DeleteOutcome> {
        match self.api.delete(&replica.name, &DeleteParams::default()).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if api_code(&e) == Some(404) => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(RolloutError::DeleteFailed {
                replica: replica.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
