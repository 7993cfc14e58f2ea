//! Conversion of pods and StatefulSets into rollout observations

use std::collections::BTreeMap;

use consensus_rollout::{ReplicaObservation, WorkloadState};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::error::Error;

/// Role a replica currently holds.
pub const ROLE_LABEL: &str = "rollout.consensus.io/role";
/// Access mode of the role a replica holds.
pub const ACCESS_MODE_LABEL: &str = "rollout.consensus.io/access-mode";
/// Role last reported by the replica's own probe.
pub const PROBED_ROLE_ANNOTATION: &str = "rollout.consensus.io/probed-role";
pub const CONFIG_TYPE_LABEL: &str = "rollout.consensus.io/config-type";
pub const ROLE_ENV_CONFIG: &str = "role-env";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
/// Set by the StatefulSet controller on every pod it creates.
pub const REVISION_LABEL: &str = "controller-revision-hash";

/// Observation of one pod for the current pass.
pub fn observe_pod(pod: &Pod) -> ReplicaObservation {
    let labels = pod.labels();
    let label = |key: &str| labels.get(key).cloned().unwrap_or_default();

    ReplicaObservation::new(pod.name_any())
        .with_role(label(ROLE_LABEL))
        .with_revision(label(REVISION_LABEL))
        .ready(is_pod_ready(pod))
        .terminating(pod.metadata.deletion_timestamp.is_some())
}

/// Whether the pod reports `Ready=True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|c| {
            c.iter()
                .any(|cond| cond.type_ == "Ready" && cond.status == "True")
        })
        .unwrap_or(false)
}

/// What the StatefulSet controller reports about its own progress.
pub fn workload_state(sts: &StatefulSet) -> WorkloadState {
    let status = sts.status.as_ref();
    WorkloadState {
        // The API server defaults an unset replica count to one.
        desired_replicas: sts
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1)
            .max(0) as usize,
        generation: sts.metadata.generation,
        observed_generation: status.and_then(|s| s.observed_generation),
        update_revision: status
            .and_then(|s| s.update_revision.clone())
            .filter(|r| !r.is_empty()),
    }
}

/// Label selector matching the pods of `sts`.
pub fn pod_selector(sts: &StatefulSet) -> Result<String, Error> {
    let match_labels = sts
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.as_ref())
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| Error::InvalidWorkload {
            name: sts.name_any(),
            reason: "selector has no matchLabels".to_string(),
        })?;

    Ok(format_selector(match_labels))
}

/// `k1=v1,k2=v2` in key order.
pub fn format_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetStatus};
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};

    fn pod(name: &str, labels: &[(&str, &str)], ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn statefulset(replicas: Option<i32>, generation: i64, observed: i64) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("mysql".to_string()),
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas,
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([
                        (INSTANCE_LABEL.to_string(), "db".to_string()),
                        (COMPONENT_LABEL.to_string(), "mysql".to_string()),
                    ])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                observed_generation: Some(observed),
                update_revision: Some("mysql-7d9f".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_observe_pod() {
        let pod = pod(
            "mysql-2",
            &[(ROLE_LABEL, "leader"), (REVISION_LABEL, "mysql-7d9f")],
            true,
        );

        let observation = observe_pod(&pod);

        assert_eq!(observation.name, "mysql-2");
        assert_eq!(observation.ordinal, Some(2));
        assert_eq!(observation.role_label, "leader");
        assert_eq!(observation.revision, "mysql-7d9f");
        assert!(observation.ready);
        assert!(!observation.terminating);
    }

    #[test]
    fn test_observe_unlabelled_terminating_pod() {
        let mut pod = pod("mysql-0", &[], false);
        pod.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let observation = observe_pod(&pod);

        assert_eq!(observation.role_label, "");
        assert_eq!(observation.revision, "");
        assert!(!observation.ready);
        assert!(observation.terminating);
    }

    #[test]
    fn test_pod_without_status_is_not_ready() {
        let mut pod = pod("mysql-0", &[], true);
        pod.status = None;
        assert!(!is_pod_ready(&pod));
    }

    #[test]
    fn test_workload_state() {
        let state = workload_state(&statefulset(Some(3), 5, 4));

        assert_eq!(state.desired_replicas, 3);
        assert_eq!(state.generation, Some(5));
        assert_eq!(state.observed_generation, Some(4));
        assert_eq!(state.update_revision.as_deref(), Some("mysql-7d9f"));
    }

    #[test]
    fn test_workload_state_defaults_to_one_replica() {
        assert_eq!(workload_state(&statefulset(None, 1, 1)).desired_replicas, 1);
    }

    #[test]
    fn test_pod_selector() {
        let selector = pod_selector(&statefulset(Some(3), 1, 1)).unwrap();
        assert_eq!(
            selector,
            "app.kubernetes.io/component=mysql,app.kubernetes.io/instance=db"
        );

        let mut sts = statefulset(Some(3), 1, 1);
        if let Some(spec) = sts.spec.as_mut() {
            spec.selector.match_labels = None;
        }
        assert!(matches!(
            pod_selector(&sts),
            Err(Error::InvalidWorkload { .. })
        ));
    }
}
