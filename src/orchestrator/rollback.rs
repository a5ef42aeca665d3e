use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::OrchestratorError;
use crate::health::aggregator::StatusChange;
use crate::notify::{Notifier, OrchestratorEvent};
use crate::orchestrator::fanout::FanoutExecutor;
use crate::orchestrator::state_machine::{DeploymentEvent, DeploymentStateMachine};
use crate::orchestrator::DeploymentLocks;
use crate::registry::ClusterTargetRegistry;
use crate::storage::Store;
use crate::types::{
    ApplyOutcome, DeploymentId, DeploymentState, HealthStatus, RollbackOutcome, RollbackRecord,
    RollbackTrigger, TargetId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Evaluating,
    RollingBack,
    Done,
}

/// Turns health signals into rollback execution. Holds one engine state per
/// deployment; the claim step guarantees at most one in-flight rollback per
/// deployment regardless of how many manual and automatic triggers race.
pub struct RollbackEngine {
    store: Arc<dyn Store>,
    fanout: Arc<FanoutExecutor>,
    registry: Arc<ClusterTargetRegistry>,
    locks: Arc<DeploymentLocks>,
    notifier: Notifier,
    engines: Mutex<HashMap<DeploymentId, EngineState>>,
}

impl RollbackEngine {
    pub fn new(
        store: Arc<dyn Store>,
        fanout: Arc<FanoutExecutor>,
        registry: Arc<ClusterTargetRegistry>,
        locks: Arc<DeploymentLocks>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            fanout,
            registry,
            locks,
            notifier,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine_state(&self, id: DeploymentId) -> EngineState {
        let engines = self.engines.lock().unwrap();
        engines.get(&id).copied().unwrap_or(EngineState::Idle)
    }

    /// Roll a deployment back to its recorded prior version. Rejected with
    /// `RollbackAlreadyInProgress` while another trigger holds the engine;
    /// a rollback that itself fails leaves the deployment `rollback_failed`
    /// and is never retried here.
    pub async fn trigger(
        &self,
        id: DeploymentId,
        trigger: RollbackTrigger,
    ) -> Result<RollbackRecord, OrchestratorError> {
        let previous = self.claim(id)?;

        match self.run(id, trigger).await {
            Ok(record) => {
                self.set_engine(id, EngineState::Done);
                Ok(record)
            }
            Err(e) => {
                self.restore(id, previous);
                Err(e)
            }
        }
    }

    fn claim(&self, id: DeploymentId) -> Result<Option<EngineState>, OrchestratorError> {
        let mut engines = self.engines.lock().unwrap();
        let current = engines.get(&id).copied();
        if matches!(
            current,
            Some(EngineState::Evaluating) | Some(EngineState::RollingBack)
        ) {
            return Err(OrchestratorError::RollbackAlreadyInProgress(id));
        }
        engines.insert(id, EngineState::Evaluating);
        Ok(current)
    }

    fn set_engine(&self, id: DeploymentId, state: EngineState) {
        let mut engines = self.engines.lock().unwrap();
        engines.insert(id, state);
    }

    fn restore(&self, id: DeploymentId, previous: Option<EngineState>) {
        let mut engines = self.engines.lock().unwrap();
        match previous {
            Some(state) => engines.insert(id, state),
            None => engines.remove(&id),
        };
    }

    async fn run(
        &self,
        id: DeploymentId,
        trigger: RollbackTrigger,
    ) -> Result<RollbackRecord, OrchestratorError> {
        let mut record;
        let prior;
        let target_ids;

        {
            let _guard = self.locks.lock(id).await;
            let mut deployment = self
                .store
                .get_deployment(id)
                .await?
                .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {id}")))?;

            if !matches!(
                deployment.state,
                DeploymentState::Healthy | DeploymentState::Degraded | DeploymentState::Failed
            ) {
                return Err(OrchestratorError::InvalidTransition {
                    from: deployment.state,
                    event: "rollback_started".to_string(),
                });
            }

            prior = deployment.prior_version.clone().ok_or_else(|| {
                OrchestratorError::Validation(
                    "deployment has no recorded prior version".to_string(),
                )
            })?;
            target_ids = deployment.targets.clone();

            record = RollbackRecord::new(id, prior.clone(), trigger.clone());
            self.store.create_rollback_record(&record).await?;

            let from = deployment.state;
            DeploymentStateMachine::transition(&mut deployment, DeploymentEvent::RollbackStarted)?;
            self.store.update_deployment(&deployment).await?;
            self.set_engine(id, EngineState::RollingBack);

            self.notifier.publish(OrchestratorEvent::RollbackTriggered {
                deployment_id: id,
                trigger,
            });
            self.notifier.publish(OrchestratorEvent::StateChanged {
                deployment_id: id,
                from,
                to: deployment.state,
            });
        }

        // The fan-out runs outside the per-deployment critical section; the
        // rolling_back state already shields the deployment from concurrent
        // operations.
        let mut results: HashMap<TargetId, ApplyOutcome> = HashMap::new();
        let mut targets = Vec::new();
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
        results.extend(self.fanout.execute(&targets, &prior).await);

        let all_ok = !results.is_empty() && results.values().all(|o| o.is_success());

        let _guard = self.locks.lock(id).await;
        let mut deployment = self
            .store
            .get_deployment(id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {id}")))?;

        let from = deployment.state;
        let (event, outcome) = if all_ok {
            (DeploymentEvent::RollbackSucceeded, RollbackOutcome::Succeeded)
        } else {
            (DeploymentEvent::RollbackFailed, RollbackOutcome::Failed)
        };

        deployment.apply_results = results;
        DeploymentStateMachine::transition(&mut deployment, event)?;
        self.store.update_deployment(&deployment).await?;

        record.finish(outcome);
        self.store.update_rollback_record(&record).await?;

        self.notifier.publish(OrchestratorEvent::StateChanged {
            deployment_id: id,
            from,
            to: deployment.state,
        });
        self.notifier.publish(OrchestratorEvent::RollbackFinished {
            deployment_id: id,
            outcome,
        });

        if !all_ok {
            log::error!(
                "rollback of deployment {} failed; manual intervention required",
                id
            );
        }

        Ok(record)
    }

    /// Watch health status changes and fire automatic rollbacks when a
    /// participating target goes down.
    pub fn spawn_monitor(
        self: Arc<Self>,
        mut changes: mpsc::UnboundedReceiver<StatusChange>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = changes.recv() => match maybe {
                        Some(change) if change.to == HealthStatus::Down => {
                            self.on_target_down(change.target_id).await;
                        }
                        Some(_) => {}
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        })
    }

    async fn on_target_down(&self, target_id: TargetId) {
        let deployments = match self.store.list_deployments(None).await {
            Ok(deployments) => deployments,
            Err(e) => {
                log::error!("cannot list deployments for rollback evaluation: {}", e);
                return;
            }
        };

        for deployment in deployments {
            let participating = deployment.targets.contains(&target_id);
            let eligible = matches!(
                deployment.state,
                DeploymentState::Healthy | DeploymentState::Degraded | DeploymentState::Failed
            );
            if !participating || !eligible || deployment.prior_version.is_none() {
                continue;
            }

            log::warn!(
                "target {} down, triggering automatic rollback of deployment {}",
                target_id,
                deployment.id
            );
            match self
                .trigger(
                    deployment.id,
                    RollbackTrigger::Automatic { target: target_id },
                )
                .await
            {
                Ok(record) => log::warn!(
                    "automatic rollback of deployment {} finished: {:?}",
                    deployment.id,
                    record.outcome
                ),
                Err(OrchestratorError::RollbackAlreadyInProgress(_)) => {}
                Err(e) => log::error!(
                    "automatic rollback of deployment {} did not run: {}",
                    deployment.id,
                    e
                ),
            }
        }
    }
}
