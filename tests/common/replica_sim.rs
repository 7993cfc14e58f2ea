// Simulated replica set for rollout tests
//
// Deleted replicas are recreated at the update revision by `advance`, first
// unready and without a role label, then ready with their old role.

use std::collections::HashSet;

use async_trait::async_trait;
use consensus_rollout::{
    DeleteOutcome, ReplicaDeleter, ReplicaObservation, Result, RolloutError, WorkloadState,
};
use parking_lot::Mutex;

struct SimReplica {
    observation: ReplicaObservation,
    /// Role restored once the replica is ready again.
    role: String,
}

/// A replica set whose controller recreates deleted replicas.
pub struct ReplicaSetSim {
    replicas: Mutex<Vec<SimReplica>>,
    update_revision: Mutex<String>,
    deleted: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<String>>,
}

impl ReplicaSetSim {
    pub fn new(replicas: Vec<ReplicaObservation>, update_revision: &str) -> Self {
        let replicas = replicas
            .into_iter()
            .map(|observation| SimReplica {
                role: observation.role_label.clone(),
                observation,
            })
            .collect();
        Self {
            replicas: Mutex::new(replicas),
            update_revision: Mutex::new(update_revision.to_string()),
            deleted: Mutex::new(Vec::new()),
            fail_on: Mutex::new(HashSet::new()),
        }
    }

    pub fn observations(&self) -> Vec<ReplicaObservation> {
        self.replicas
            .lock()
            .iter()
            .map(|r| r.observation.clone())
            .collect()
    }

    /// Converged workload state for the current replicas.
    pub fn workload(&self) -> WorkloadState {
        WorkloadState {
            desired_replicas: self.replicas.lock().len(),
            generation: Some(2),
            observed_generation: Some(2),
            update_revision: Some(self.update_revision.lock().clone()),
        }
    }

    /// Every delete accepted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    /// Replicas that are terminating or not ready.
    pub fn unavailable(&self) -> Vec<String> {
        self.replicas
            .lock()
            .iter()
            .filter(|r| r.observation.terminating || !r.observation.ready)
            .map(|r| r.observation.name.clone())
            .collect()
    }

    /// Role each replica holds once ready.
    pub fn role_of(&self, name: &str) -> Option<String> {
        self.replicas
            .lock()
            .iter()
            .find(|r| r.observation.name == name)
            .map(|r| r.role.clone())
    }

    pub fn fail_deletes_of(&self, name: &str) {
        self.fail_on.lock().insert(name.to_string());
    }

    /// Move every replica one step closer to settled.
    pub fn advance(&self) {
        let revision = self.update_revision.lock().clone();
        for replica in self.replicas.lock().iter_mut() {
            let observation = &mut replica.observation;
            if observation.terminating {
                *observation = ReplicaObservation::new(observation.name.clone())
                    .with_revision(revision.clone())
                    .ready(false);
            } else if !observation.ready {
                observation.ready = true;
                observation.role_label = replica.role.clone();
            }
        }
    }

    /// Advance until nothing is unavailable.
    pub fn settle(&self) {
        while !self.unavailable().is_empty() {
            self.advance();
        }
    }
}

#[async_trait]
impl ReplicaDeleter for ReplicaSetSim {
    async fn delete_replica(&self, replica: &ReplicaObservation) -> Result<DeleteOutcome> {
        if self.fail_on.lock().contains(&replica.name) {
            return Err(RolloutError::DeleteFailed {
                replica: replica.name.clone(),
                reason: "admission webhook denied the request".to_string(),
            });
        }

        let mut replicas = self.replicas.lock();
        match replicas
            .iter_mut()
            .find(|r| r.observation.name == replica.name)
        {
            Some(found) if !found.observation.terminating => {
                found.observation.terminating = true;
                self.deleted.lock().push(replica.name.clone());
                Ok(DeleteOutcome::Deleted)
            }
            _ => Ok(DeleteOutcome::AlreadyGone),
        }
    }
}
