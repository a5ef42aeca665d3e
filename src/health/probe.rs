use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::clients::ClusterClient;
use crate::health::aggregator::{StatusChange, UptimeAggregator};
use crate::registry::ClusterTargetRegistry;
use crate::types::{ClusterTarget, ProbeOutcome, TargetId};

/// Issues one probe per target on a fixed interval, independent of any
/// deployment activity. Each registered target gets its own probe task; the
/// supervisor reconciles tasks against the registry so targets added or
/// removed at runtime are picked up.
pub struct ProbeScheduler {
    client: Arc<dyn ClusterClient>,
    registry: Arc<ClusterTargetRegistry>,
    aggregator: Arc<UptimeAggregator>,
    interval: Duration,
    probe_timeout: Duration,
    changes: mpsc::UnboundedSender<StatusChange>,
}

impl ProbeScheduler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        registry: Arc<ClusterTargetRegistry>,
        aggregator: Arc<UptimeAggregator>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<StatusChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                registry,
                aggregator,
                interval,
                probe_timeout,
                changes,
            },
            rx,
        )
    }

    /// Start the supervisor. It owns one probe loop per registered target
    /// and tears everything down when the shutdown signal fires.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut loops: HashMap<TargetId, JoinHandle<()>> = HashMap::new();
            let mut ticker = tokio::time::interval(self.interval);
            let loop_shutdown = shutdown.clone();

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.reconcile(&mut loops, &loop_shutdown),
                    _ = shutdown.changed() => break,
                }
            }

            for (_, handle) in loops.drain() {
                handle.abort();
            }
        })
    }

    fn reconcile(
        &self,
        loops: &mut HashMap<TargetId, JoinHandle<()>>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let targets = self.registry.list();

        loops.retain(|id, handle| {
            let keep = targets.iter().any(|t| &t.id == id) && !handle.is_finished();
            if !keep {
                handle.abort();
            }
            keep
        });

        for target in targets {
            if !loops.contains_key(&target.id) {
                let handle = self.spawn_target_loop(target.clone(), shutdown.clone());
                loops.insert(target.id, handle);
            }
        }
    }

    fn spawn_target_loop(
        &self,
        target: ClusterTarget,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let registry = self.registry.clone();
        let aggregator = self.aggregator.clone();
        let changes = self.changes.clone();
        let interval = self.interval;
        let probe_timeout = self.probe_timeout;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = probe_once(&*client, &target, probe_timeout).await;
                        registry.mark_reachable(&target.id, outcome.success);
                        if let Some(change) = aggregator.record(outcome) {
                            log::warn!(
                                "target {} ({}) health {} -> {}",
                                target.name, target.id, change.from, change.to
                            );
                            let _ = changes.send(change);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}

/// One probe call, bounded by its own timeout so a hung health endpoint
/// counts as a failed sample rather than stalling the loop.
pub async fn probe_once(
    client: &dyn ClusterClient,
    target: &ClusterTarget,
    probe_timeout: Duration,
) -> ProbeOutcome {
    match tokio::time::timeout(probe_timeout, client.probe_health(target)).await {
        Ok(result) if result.ok => ProbeOutcome::success(target.id, result.latency_ms),
        Ok(result) => ProbeOutcome {
            target_id: target.id,
            timestamp: Utc::now(),
            success: false,
            latency_ms: result.latency_ms,
            error_class: result.error.or_else(|| Some("unknown".to_string())),
        },
        Err(_) => ProbeOutcome::failure(target.id, probe_timeout.as_millis() as u64, "timeout"),
    }
}
