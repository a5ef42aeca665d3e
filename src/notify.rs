use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clients::NotificationGateway;
use crate::types::{
    ArtifactRef, DeploymentId, DeploymentState, RollbackOutcome, RollbackTrigger,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    DeploymentSubmitted {
        deployment_id: DeploymentId,
        artifact: ArtifactRef,
    },
    StateChanged {
        deployment_id: DeploymentId,
        from: DeploymentState,
        to: DeploymentState,
    },
    RollbackTriggered {
        deployment_id: DeploymentId,
        trigger: RollbackTrigger,
    },
    RollbackFinished {
        deployment_id: DeploymentId,
        outcome: RollbackOutcome,
    },
}

/// Outbound event queue. Publishing never blocks and never fails the caller;
/// a background task drains the queue into the gateway and only logs
/// delivery problems.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<OrchestratorEvent>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OrchestratorEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = gateway.notify(&event).await {
                    log::warn!("notification delivery failed: {}", e);
                }
            }
        });

        (Self { tx }, handle)
    }

    pub fn publish(&self, event: OrchestratorEvent) {
        // A closed channel means shutdown is underway; dropping the event is
        // the intended behavior for a fire-and-forget sink.
        let _ = self.tx.send(event);
    }
}

/// Gateway that writes events to the log. Default sink for the binary.
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn notify(&self, event: &OrchestratorEvent) -> Result<()> {
        log::info!("event: {}", serde_json::to_string(event)?);
        Ok(())
    }
}
