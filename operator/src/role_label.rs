//! Sync of probed roles into pod labels
//!
//! Replicas report their role through the probed-role annotation. Known roles
//! are copied into the role and access-mode labels that observations and
//! services select on; roles the component does not define are left alone.

use std::collections::BTreeMap;

use consensus_rollout::RoleMap;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

use crate::error::Error;
use crate::observe::{ACCESS_MODE_LABEL, PROBED_ROLE_ANNOTATION, ROLE_LABEL};

/// Labels `pod` is missing for its probed role, if any.
pub fn pending_labels(pod: &Pod, roles: &RoleMap) -> Option<BTreeMap<String, String>> {
    let probed = pod.annotations().get(PROBED_ROLE_ANNOTATION)?;
    let Some(target) = roles.labels_for(probed) else {
        debug!(pod = %pod.name_any(), role = %probed, "Ignoring undefined probed role");
        return None;
    };

    let wanted = BTreeMap::from([
        (ROLE_LABEL.to_string(), target.role),
        (
            ACCESS_MODE_LABEL.to_string(),
            target.access_mode.as_str().to_string(),
        ),
    ]);
    let labels = pod.labels();
    if wanted.iter().all(|(k, v)| labels.get(k) == Some(v)) {
        return None;
    }
    Some(wanted)
}

/// Patch the role labels of every pod whose probed role changed.
///
/// Patched pods are replaced in `pods` so the current pass observes the new
/// labels. Returns the number of pods patched.
pub async fn sync_role_labels(
    api: &Api<Pod>,
    pods: &mut [Pod],
    roles: &RoleMap,
    field_manager: &str,
) -> Result<usize, Error> {
    let pp = PatchParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    };
    let mut patched = 0;

    for pod in pods.iter_mut() {
        let Some(labels) = pending_labels(pod, roles) else {
            continue;
        };
        let name = pod.name_any();
        let patch = json!({ "metadata": { "labels": labels } });
        *pod = api.patch(&name, &pp, &Patch::Merge(&patch)).await?;

        info!(
            pod = %name,
            role = %labels[ROLE_LABEL],
            access_mode = %labels[ACCESS_MODE_LABEL],
            "Role label updated"
        );
        patched += 1;
    }

    Ok(patched)
}
