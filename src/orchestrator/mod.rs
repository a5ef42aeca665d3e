pub mod fanout;
pub mod rollback;
pub mod state_machine;

pub use fanout::{FanoutConfig, FanoutExecutor};
pub use rollback::{EngineState, RollbackEngine};
pub use state_machine::{DeploymentEvent, DeploymentStateMachine};

use chrono::Duration as ChronoDuration;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

use crate::clients::ArtifactStore;
use crate::error::OrchestratorError;
use crate::health::aggregator::{UptimeAggregator, UptimeStats};
use crate::notify::{Notifier, OrchestratorEvent};
use crate::registry::ClusterTargetRegistry;
use crate::storage::Store;
use crate::types::{
    AggregationPolicy, ApplyOutcome, ArtifactRef, ClusterTarget, DeploymentId, DeploymentRequest,
    DeploymentState, HealthStatus, RollbackRecord, RollbackTrigger, TargetId,
};

/// Keyed async mutexes serializing all transitions of one deployment.
/// Different deployments never contend with each other.
pub struct DeploymentLocks {
    inner: StdMutex<HashMap<DeploymentId, Arc<TokioMutex<()>>>>,
}

impl DeploymentLocks {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, id: DeploymentId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.inner.lock().unwrap();
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}

impl Default for DeploymentLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub artifact: ArtifactRef,
    pub targets: Vec<TargetId>,
    pub requested_by: String,
    pub prior_version: Option<ArtifactRef>,
    pub policy: Option<AggregationPolicy>,
}

/// The deployment lifecycle orchestrator. Owns the state machine, routes
/// apply fan-outs, and exposes the operations the API layer consumes.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    registry: Arc<ClusterTargetRegistry>,
    artifacts: Arc<dyn ArtifactStore>,
    fanout: Arc<FanoutExecutor>,
    rollback: Arc<RollbackEngine>,
    aggregator: Arc<UptimeAggregator>,
    notifier: Notifier,
    locks: Arc<DeploymentLocks>,
    in_flight: StdMutex<HashSet<DeploymentId>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ClusterTargetRegistry>,
        artifacts: Arc<dyn ArtifactStore>,
        fanout: Arc<FanoutExecutor>,
        rollback: Arc<RollbackEngine>,
        aggregator: Arc<UptimeAggregator>,
        notifier: Notifier,
        locks: Arc<DeploymentLocks>,
    ) -> Self {
        Self {
            store,
            registry,
            artifacts,
            fanout,
            rollback,
            aggregator,
            notifier,
            locks,
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &ClusterTargetRegistry {
        &self.registry
    }

    pub fn rollback_engine(&self) -> &Arc<RollbackEngine> {
        &self.rollback
    }

    /// Validate and record a new deployment request. No state beyond the
    /// request itself is touched; the request starts `pending`.
    pub async fn submit(
        &self,
        request: SubmitRequest,
    ) -> Result<DeploymentRequest, OrchestratorError> {
        if request.targets.is_empty() {
            return Err(OrchestratorError::Validation(
                "at least one target is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for target_id in &request.targets {
            if !seen.insert(*target_id) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate target {target_id}"
                )));
            }
            if self.registry.get(target_id).is_none() {
                return Err(OrchestratorError::Validation(format!(
                    "unknown target {target_id}"
                )));
            }
        }
        self.artifacts
            .resolve(&request.artifact)
            .await
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
        if let Some(prior) = &request.prior_version {
            self.artifacts
                .resolve(prior)
                .await
                .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
        }

        let deployment = DeploymentRequest::new(
            request.artifact,
            request.targets,
            request.requested_by,
            request.prior_version,
            request.policy.unwrap_or_default(),
        );
        self.store.create_deployment(&deployment).await?;

        self.notifier.publish(OrchestratorEvent::DeploymentSubmitted {
            deployment_id: deployment.id,
            artifact: deployment.artifact.clone(),
        });

        Ok(deployment)
    }

    /// Approve a pending deployment and kick off the apply fan-out. The
    /// request moves to `syncing` immediately; per-target results land
    /// asynchronously.
    pub async fn approve(
        self: Arc<Self>,
        id: DeploymentId,
        actor: &str,
    ) -> Result<DeploymentRequest, OrchestratorError> {
        let _guard = self.locks.lock(id).await;

        {
            let in_flight = self.in_flight.lock().unwrap();
            if in_flight.contains(&id) {
                return Err(OrchestratorError::ConflictingOperation(id));
            }
        }

        let mut deployment = self.get(id).await?;
        let from = deployment.state;
        DeploymentStateMachine::transition(
            &mut deployment,
            DeploymentEvent::Approved {
                actor: actor.to_string(),
            },
        )?;
        DeploymentStateMachine::transition(&mut deployment, DeploymentEvent::SyncStarted)?;
        self.store.update_deployment(&deployment).await?;

        self.in_flight.lock().unwrap().insert(id);
        self.notifier.publish(OrchestratorEvent::StateChanged {
            deployment_id: id,
            from,
            to: deployment.state,
        });

        let orchestrator = Arc::clone(&self);
        let artifact = deployment.artifact.clone();
        let target_ids = deployment.targets.clone();
        tokio::spawn(async move {
            orchestrator.run_fanout(id, artifact, target_ids).await;
        });

        Ok(deployment)
    }

    pub async fn reject(
        &self,
        id: DeploymentId,
        reason: &str,
    ) -> Result<DeploymentRequest, OrchestratorError> {
        let _guard = self.locks.lock(id).await;

        let mut deployment = self.get(id).await?;
        let from = deployment.state;
        DeploymentStateMachine::transition(
            &mut deployment,
            DeploymentEvent::Rejected {
                reason: reason.to_string(),
            },
        )?;
        self.store.update_deployment(&deployment).await?;

        self.notifier.publish(OrchestratorEvent::StateChanged {
            deployment_id: id,
            from,
            to: deployment.state,
        });

        Ok(deployment)
    }

    pub async fn manual_rollback(
        &self,
        id: DeploymentId,
        actor: &str,
    ) -> Result<RollbackRecord, OrchestratorError> {
        self.rollback
            .trigger(
                id,
                RollbackTrigger::Manual {
                    actor: actor.to_string(),
                },
            )
            .await
    }

    pub async fn status(&self, id: DeploymentId) -> Result<DeploymentRequest, OrchestratorError> {
        self.get(id).await
    }

    pub async fn list(
        &self,
        state: Option<DeploymentState>,
    ) -> Result<Vec<DeploymentRequest>, OrchestratorError> {
        Ok(self.store.list_deployments(state).await?)
    }

    pub async fn rollback_history(
        &self,
        id: DeploymentId,
    ) -> Result<Vec<RollbackRecord>, OrchestratorError> {
        self.get(id).await?;
        Ok(self.store.list_rollback_records(id).await?)
    }

    pub fn target_health(&self, target_id: &TargetId) -> Result<HealthStatus, OrchestratorError> {
        if self.registry.get(target_id).is_none() {
            return Err(OrchestratorError::NotFound(format!("target {target_id}")));
        }
        Ok(self.aggregator.status(target_id))
    }

    pub fn uptime(
        &self,
        target_id: &TargetId,
        window: Option<ChronoDuration>,
    ) -> Result<UptimeStats, OrchestratorError> {
        if self.registry.get(target_id).is_none() {
            return Err(OrchestratorError::NotFound(format!("target {target_id}")));
        }
        Ok(self
            .aggregator
            .uptime(target_id, window)
            .unwrap_or(UptimeStats {
                target_id: *target_id,
                samples: 0,
                successes: 0,
                uptime_pct: 100.0,
                status: HealthStatus::Up,
            }))
    }

    async fn get(&self, id: DeploymentId) -> Result<DeploymentRequest, OrchestratorError> {
        self.store
            .get_deployment(id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {id}")))
    }

    async fn run_fanout(&self, id: DeploymentId, artifact: ArtifactRef, target_ids: Vec<TargetId>) {
        let mut results: HashMap<TargetId, ApplyOutcome> = HashMap::new();
        let mut targets: Vec<ClusterTarget> = Vec::new();
        for target_id in &target_ids {
            match self.registry.get(target_id) {
                Some(target) => targets.push(target),
                None => {
                    results.insert(
                        *target_id,
                        ApplyOutcome::ConfigurationError {
                            detail: "target no longer registered".to_string(),
                        },
                    );
                }
            }
        }
        results.extend(self.fanout.execute(&targets, &artifact).await);

        if let Err(e) = self.complete_fanout(id, results).await {
            log::error!("fan-out completion failed for deployment {}: {}", id, e);
        }

        self.in_flight.lock().unwrap().remove(&id);
    }

    async fn complete_fanout(
        &self,
        id: DeploymentId,
        results: HashMap<TargetId, ApplyOutcome>,
    ) -> Result<(), OrchestratorError> {
        let _guard = self.locks.lock(id).await;

        let mut deployment = self.get(id).await?;
        let from = deployment.state;
        let event = fanout::aggregate(&results, deployment.policy);
        deployment.apply_results = results;
        DeploymentStateMachine::transition(&mut deployment, event)?;
        self.store.update_deployment(&deployment).await?;

        self.notifier.publish(OrchestratorEvent::StateChanged {
            deployment_id: id,
            from,
            to: deployment.state,
        });

        Ok(())
    }
}
