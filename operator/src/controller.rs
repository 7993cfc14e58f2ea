//! Kubernetes controller for consensus components

use std::sync::Arc;
use std::time::{Duration, Instant};

use consensus_rollout::config::RolloutConfig;
use consensus_rollout::resilience::BackoffTracker;
use consensus_rollout::{
    ComponentRef, Orchestrator, PassInput, PassOutcome, RoleMap, RolloutProgress,
};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{self, Action, Controller as KubeController};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::crd::{ConsensusComponent, ConsensusComponentStatus, RolloutCondition, RolloutPhase};
use crate::error::Error;
use crate::metrics::Metrics;
use crate::observe::{observe_pod, pod_selector, workload_state, INSTANCE_LABEL};
use crate::role_label::sync_role_labels;
use crate::store::{KubeConfigStore, KubePodDeleter, KubeStatusStore};

/// Condition reporting whether every replica runs the update revision.
pub const ROLLOUT_CONDITION: &str = "RolloutComplete";

/// Shared state handed to every reconcile
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub config: RolloutConfig,
    pub orchestrator: Orchestrator,
    pub metrics: Metrics,
    /// Consecutive failures per `namespace/name`
    pub backoff: BackoffTracker<String>,
}

/// Main controller for ConsensusComponent resources
pub struct Controller {
    client: Client,
    namespace: String,
    context: Arc<Context>,
}

impl Controller {
    /// Create a new controller
    pub async fn new(
        namespace: String,
        config: RolloutConfig,
        metrics: Metrics,
    ) -> Result<Self, Error> {
        let client = Client::try_default().await?;

        let context = Context {
            client: client.clone(),
            orchestrator: Orchestrator::new(&config),
            backoff: BackoffTracker::new(config.retry.clone()),
            config,
            metrics,
        };

        Ok(Self {
            client,
            namespace,
            context: Arc::new(context),
        })
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        if self.namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), &self.namespace)
        }
    }

    /// Run the controller
    pub async fn run(self) -> Result<(), Error> {
        info!("Starting consensus rollout controller");

        let components: Api<ConsensusComponent> = self.api();
        let statefulsets: Api<StatefulSet> = self.api();
        let pods: Api<Pod> = self.api();

        // Verify CRD is installed
        let lp = ListParams::default().limit(1);
        if let Err(e) = components.list(&lp).await {
            error!("Failed to list ConsensusComponents. Is the CRD installed? Error: {}", e);
            return Err(Error::CrdNotInstalled);
        }

        info!("CRD verification successful");

        let concurrency = u16::try_from(self.context.config.max_concurrent_reconciles)
            .map_err(|_| Error::InvalidConfig("max_concurrent_reconciles exceeds u16".into()))?;

        // Template changes under OnDelete touch no pod, so the StatefulSet
        // itself is watched to start rollouts.
        let context = self.context.clone();
        KubeController::new(components, watcher::Config::default())
            .with_config(controller::Config::default().concurrency(concurrency))
            .watches(
                statefulsets,
                watcher::Config::default().labels(INSTANCE_LABEL),
                |sts: StatefulSet| component_for_instance(&sts),
            )
            .watches(
                pods,
                watcher::Config::default().labels(INSTANCE_LABEL),
                |pod: Pod| component_for_instance(&pod),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.context)
            .for_each(|result| {
                let context = context.clone();
                async move {
                    match result {
                        Ok((obj, action)) => {
                            debug!(name = %obj.name, ?action, "Reconciliation successful");
                        }
                        Err(e) => {
                            if let Some(key) = deleted_component_key(&e) {
                                debug!(component = %key, "Component gone, dropping backoff");
                                context.backoff.reset(&key);
                            } else {
                                warn!(error = %e, "Reconciliation error");
                            }
                        }
                    }
                }
            })
            .await;

        info!("Controller stopped");
        Ok(())
    }
}

/// Pods and StatefulSets map to the component named by their instance label.
fn component_for_instance<K: Resource>(obj: &K) -> Option<ObjectRef<ConsensusComponent>> {
    let instance = obj.labels().get(INSTANCE_LABEL)?;
    let namespace = obj.namespace()?;
    Some(ObjectRef::new(instance).within(&namespace))
}

fn backoff_key(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name)
}

fn object_key(component: &ConsensusComponent) -> String {
    backoff_key(component.namespace().as_deref(), &component.name_any())
}

/// Backoff key of a component whose scheduled pass found it deleted.
fn deleted_component_key(error: &controller::Error<Error, watcher::Error>) -> Option<String> {
    match error {
        controller::Error::ObjectNotFound(obj) => {
            Some(backoff_key(obj.namespace.as_deref(), &obj.name))
        }
        _ => None,
    }
}

/// Reconcile a ConsensusComponent resource
async fn reconcile(component: Arc<ConsensusComponent>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start = Instant::now();
    let key = object_key(&component);
    let name = component.name_any();
    let namespace = component
        .namespace()
        .ok_or_else(|| Error::InvalidConfig(format!("{} is not namespaced", name)))?;

    debug!(name = %name, namespace = %namespace, "Reconciling ConsensusComponent");

    let statefulsets: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let sts = statefulsets
        .get_opt(&component.spec.workload_ref)
        .await?
        .ok_or_else(|| {
            Error::WorkloadNotFound(format!("{}/{}", namespace, component.spec.workload_ref))
        })?;

    let pod_api: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let lp = ListParams::default().labels(&pod_selector(&sts)?);
    let mut pods = pod_api.list(&lp).await?.items;

    let roles = RoleMap::classify(&component.spec.roles);
    sync_role_labels(&pod_api, &mut pods, &roles, &ctx.config.field_manager).await?;

    let input = PassInput {
        component: ComponentRef::new(&namespace, &name, component.component_name()),
        role_spec: component.spec.roles.clone(),
        replicas: pods.iter().map(observe_pod).collect(),
        previous_status: component.consensus_status().cloned(),
        base_version: component.resource_version(),
        workload: workload_state(&sts),
    };

    let status_store = KubeStatusStore::new(ctx.client.clone(), &ctx.config.field_manager);
    let config_store = KubeConfigStore::new(ctx.client.clone(), &ctx.config.field_manager);
    let deleter = KubePodDeleter::new(pod_api);
    let outcome = ctx
        .orchestrator
        .reconcile_pass(&input, &status_store, &config_store, &deleter)
        .await?;

    let desired = rollout_status(
        component.status.as_ref(),
        &outcome,
        component.metadata.generation.unwrap_or_default(),
        input.workload.update_revision.clone(),
    );
    if needs_update(component.status.as_ref(), &desired) {
        update_status(&ctx, &namespace, &name, &desired).await?;
    }

    ctx.metrics.record_pass(
        &key,
        outcome.status_changed,
        &outcome.progress,
        start.elapsed().as_secs_f64(),
    );
    ctx.backoff.reset(&key);

    Ok(next_action(&outcome.progress, &ctx.config))
}

/// Error policy for reconciliation failures
fn error_policy(component: Arc<ConsensusComponent>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&component);
    ctx.metrics.record_failure(&key, error.metric_label());

    let delay = if error.is_conflict() {
        ctx.config.recheck_interval
    } else {
        ctx.backoff.next_delay(key.clone())
    };
    warn!(
        component = %key,
        error = %error,
        attempts = ctx.backoff.attempts(&key),
        retry_in = ?delay,
        "Reconciliation failed, will retry"
    );
    Action::requeue(delay)
}

/// Requeue policy after a successful pass.
pub fn next_action(progress: &RolloutProgress, config: &RolloutConfig) -> Action {
    Action::requeue(requeue_after(progress, config))
}

fn requeue_after(progress: &RolloutProgress, config: &RolloutConfig) -> Duration {
    if progress.is_complete() {
        config.resync_interval
    } else {
        config.recheck_interval
    }
}

/// Phase, message and condition implied by a pass.
pub fn rollout_status(
    current: Option<&ConsensusComponentStatus>,
    outcome: &PassOutcome,
    generation: i64,
    update_revision: Option<String>,
) -> ConsensusComponentStatus {
    let (phase, message) = match &outcome.progress {
        RolloutProgress::NotReady(reason) => (RolloutPhase::Pending, reason.to_string()),
        RolloutProgress::InProgress {
            current_batch,
            total_batches,
            ..
        } => (
            RolloutPhase::Updating,
            format!("Updating batch {}/{}", current_batch + 1, total_batches),
        ),
        RolloutProgress::Complete => (
            RolloutPhase::Running,
            "All replicas at the update revision".to_string(),
        ),
    };

    let complete = if outcome.progress.is_complete() {
        "True"
    } else {
        "False"
    };
    let previous = current.and_then(|s| {
        s.conditions
            .iter()
            .find(|c| c.condition_type == ROLLOUT_CONDITION)
    });
    let last_transition_time = match previous {
        Some(c) if c.status == complete => c.last_transition_time.clone(),
        _ => Some(chrono::Utc::now().to_rfc3339()),
    };

    ConsensusComponentStatus {
        phase,
        consensus_set_status: Some(outcome.status.clone()),
        update_revision,
        conditions: vec![RolloutCondition {
            condition_type: ROLLOUT_CONDITION.to_string(),
            status: complete.to_string(),
            last_transition_time,
            reason: Some(phase.as_str().to_string()),
            message: Some(message.clone()),
        }],
        observed_generation: generation,
        message: Some(message),
    }
}

/// Whether the rollout fields of `current` differ from `desired`.
pub fn needs_update(
    current: Option<&ConsensusComponentStatus>,
    desired: &ConsensusComponentStatus,
) -> bool {
    match current {
        None => true,
        Some(current) => {
            current.phase != desired.phase
                || current.message != desired.message
                || current.update_revision != desired.update_revision
                || current.observed_generation != desired.observed_generation
                || current.conditions != desired.conditions
        }
    }
}

/// Patch the rollout fields of the status. The consensus set is written
/// separately under optimistic concurrency and is left out here.
async fn update_status(
    ctx: &Context,
    namespace: &str,
    name: &str,
    status: &ConsensusComponentStatus,
) -> Result<(), Error> {
    let api: Api<ConsensusComponent> = Api::namespaced(ctx.client.clone(), namespace);

    let patch = json!({
        "status": {
            "phase": status.phase,
            "message": status.message,
            "updateRevision": status.update_revision,
            "observedGeneration": status.observed_generation,
            "conditions": status.conditions,
        }
    });

    let pp = PatchParams {
        field_manager: Some(ctx.config.field_manager.clone()),
        ..Default::default()
    };
    api.patch_status(name, &pp, &Patch::Merge(&patch)).await?;

    info!(name = %name, phase = status.phase.as_str(), "Rollout status updated");
    Ok(())
}
