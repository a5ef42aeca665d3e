use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::clients::ClusterClient;
use crate::orchestrator::state_machine::DeploymentEvent;
use crate::types::{AggregationPolicy, ApplyOutcome, ArtifactRef, ClusterTarget, TargetId};

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Budget for a single apply attempt against one target.
    pub per_target_timeout: Duration,
    /// Hard ceiling for the whole fan-out, hung targets included.
    pub ceiling_timeout: Duration,
    /// Extra attempts after the first, for retryable outcomes only.
    pub max_retries: u32,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            per_target_timeout: Duration::from_secs(30),
            ceiling_timeout: Duration::from_secs(180),
            max_retries: 2,
        }
    }
}

/// Dispatches one apply call per target concurrently and collects per-target
/// outcomes under a bounded time budget. Rollback execution reuses this
/// primitive against the prior artifact version.
pub struct FanoutExecutor {
    client: Arc<dyn ClusterClient>,
    config: FanoutConfig,
}

impl FanoutExecutor {
    pub fn new(client: Arc<dyn ClusterClient>, config: FanoutConfig) -> Self {
        Self { client, config }
    }

    pub async fn execute(
        &self,
        targets: &[ClusterTarget],
        artifact: &ArtifactRef,
    ) -> HashMap<TargetId, ApplyOutcome> {
        let mut set = JoinSet::new();

        for target in targets {
            let client = self.client.clone();
            let target = target.clone();
            let artifact = artifact.clone();
            let per_target_timeout = self.config.per_target_timeout;
            let max_retries = self.config.max_retries;

            set.spawn(async move {
                let outcome =
                    apply_with_retry(&*client, &target, &artifact, per_target_timeout, max_retries)
                        .await;
                (target.id, outcome)
            });
        }

        let deadline = Instant::now() + self.config.ceiling_timeout;
        let mut results: HashMap<TargetId, ApplyOutcome> = HashMap::new();

        while !set.is_empty() {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((target_id, outcome)))) => {
                    results.insert(target_id, outcome);
                }
                Ok(Some(Err(e))) => {
                    log::error!("fan-out task failed: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    // Ceiling reached: whatever has not resolved is a timeout.
                    set.abort_all();
                    break;
                }
            }
        }

        for target in targets {
            results.entry(target.id).or_insert(ApplyOutcome::Timeout);
        }

        results
    }
}

/// Retries only the transient/network classes. A configuration error is
/// definitive on the first attempt.
async fn apply_with_retry(
    client: &dyn ClusterClient,
    target: &ClusterTarget,
    artifact: &ArtifactRef,
    per_target_timeout: Duration,
    max_retries: u32,
) -> ApplyOutcome {
    let mut last = ApplyOutcome::Timeout;

    for attempt in 0..=max_retries {
        let outcome =
            match tokio::time::timeout(per_target_timeout, client.apply(target, artifact)).await {
                Ok(outcome) => outcome,
                Err(_) => ApplyOutcome::Timeout,
            };

        if outcome.is_retryable() && attempt < max_retries {
            log::warn!(
                "apply to {} attempt {} failed, retrying: {:?}",
                target.name,
                attempt + 1,
                outcome
            );
            last = outcome;
            continue;
        }

        return outcome;
    }

    last
}

/// Fold per-target outcomes into the deployment event the state machine
/// consumes. The default policy requires full success; the best-effort
/// override accepts a strict majority.
pub fn aggregate(
    results: &HashMap<TargetId, ApplyOutcome>,
    policy: AggregationPolicy,
) -> DeploymentEvent {
    let total = results.len();
    let successes = results.values().filter(|o| o.is_success()).count();

    if total > 0 && successes == total {
        DeploymentEvent::ApplySucceeded
    } else if successes == 0 {
        DeploymentEvent::ApplyFailed
    } else {
        match policy {
            AggregationPolicy::AllMustSucceed => DeploymentEvent::ApplyMixed,
            AggregationPolicy::BestEffortMajority => {
                if successes * 2 > total {
                    DeploymentEvent::ApplySucceeded
                } else {
                    DeploymentEvent::ApplyMixed
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ProbeResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Client scripted per target: a queue of outcomes, then success.
    struct ScriptedClient {
        scripts: Mutex<HashMap<TargetId, Vec<ApplyOutcome>>>,
        hung: Mutex<Vec<TargetId>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                hung: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn script(&self, target: TargetId, outcomes: Vec<ApplyOutcome>) {
            self.scripts.lock().unwrap().insert(target, outcomes);
        }

        fn hang(&self, target: TargetId) {
            self.hung.lock().unwrap().push(target);
        }
    }

    #[async_trait]
    impl ClusterClient for ScriptedClient {
        async fn apply(&self, target: &ClusterTarget, _artifact: &ArtifactRef) -> ApplyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hung.lock().unwrap().contains(&target.id) {
                std::future::pending::<()>().await;
            }
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&target.id) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => ApplyOutcome::Success,
            }
        }

        async fn probe_health(&self, _target: &ClusterTarget) -> ProbeResult {
            ProbeResult {
                ok: true,
                latency_ms: 1,
                error: None,
            }
        }
    }

    fn targets(n: usize) -> Vec<ClusterTarget> {
        (0..n)
            .map(|i| ClusterTarget::new(format!("t{i}"), format!("http://t{i}")))
            .collect()
    }

    fn config() -> FanoutConfig {
        FanoutConfig {
            per_target_timeout: Duration::from_millis(50),
            ceiling_timeout: Duration::from_millis(500),
            max_retries: 2,
        }
    }

    #[tokio::test]
    async fn test_all_targets_succeed() {
        let client = Arc::new(ScriptedClient::new());
        let executor = FanoutExecutor::new(client, config());
        let targets = targets(3);

        let results = executor
            .execute(&targets, &ArtifactRef::new("api", "1.2.0"))
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.values().all(|o| o.is_success()));
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_to_success() {
        let client = Arc::new(ScriptedClient::new());
        let targets = targets(1);
        client.script(
            targets[0].id,
            vec![
                ApplyOutcome::TransientError {
                    detail: "connection reset".to_string(),
                },
                ApplyOutcome::TransientError {
                    detail: "connection reset".to_string(),
                },
            ],
        );
        let executor = FanoutExecutor::new(client.clone(), config());

        let results = executor
            .execute(&targets, &ArtifactRef::new("api", "1.2.0"))
            .await;
        assert!(results[&targets[0].id].is_success());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let client = Arc::new(ScriptedClient::new());
        let targets = targets(1);
        client.script(
            targets[0].id,
            vec![ApplyOutcome::ConfigurationError {
                detail: "bad artifact reference".to_string(),
            }],
        );
        let executor = FanoutExecutor::new(client.clone(), config());

        let results = executor
            .execute(&targets, &ArtifactRef::new("api", "1.2.0"))
            .await;
        assert!(matches!(
            results[&targets[0].id],
            ApplyOutcome::ConfigurationError { .. }
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_exhausted() {
        let client = Arc::new(ScriptedClient::new());
        let targets = targets(1);
        client.script(
            targets[0].id,
            vec![
                ApplyOutcome::TransientError {
                    detail: "reset".to_string(),
                };
                3
            ],
        );
        let executor = FanoutExecutor::new(client.clone(), config());

        let results = executor
            .execute(&targets, &ArtifactRef::new("api", "1.2.0"))
            .await;
        assert!(matches!(
            results[&targets[0].id],
            ApplyOutcome::TransientError { .. }
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hung_target_is_bounded_by_ceiling() {
        let client = Arc::new(ScriptedClient::new());
        let targets = targets(2);
        client.hang(targets[0].id);
        let executor = FanoutExecutor::new(client, config());

        let started = std::time::Instant::now();
        let results = executor
            .execute(&targets, &ArtifactRef::new("api", "1.2.0"))
            .await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(results[&targets[0].id], ApplyOutcome::Timeout);
        assert!(results[&targets[1].id].is_success());
    }

    #[test]
    fn test_aggregate_all_success() {
        let mut results = HashMap::new();
        results.insert(TargetId::new_v4(), ApplyOutcome::Success);
        results.insert(TargetId::new_v4(), ApplyOutcome::Success);

        assert!(matches!(
            aggregate(&results, AggregationPolicy::AllMustSucceed),
            DeploymentEvent::ApplySucceeded
        ));
    }

    #[test]
    fn test_aggregate_all_failed() {
        let mut results = HashMap::new();
        results.insert(TargetId::new_v4(), ApplyOutcome::Timeout);
        results.insert(
            TargetId::new_v4(),
            ApplyOutcome::TransientError {
                detail: "reset".to_string(),
            },
        );

        assert!(matches!(
            aggregate(&results, AggregationPolicy::AllMustSucceed),
            DeploymentEvent::ApplyFailed
        ));
    }

    #[test]
    fn test_aggregate_mixed_default_policy() {
        let mut results = HashMap::new();
        results.insert(TargetId::new_v4(), ApplyOutcome::Success);
        results.insert(TargetId::new_v4(), ApplyOutcome::Timeout);

        assert!(matches!(
            aggregate(&results, AggregationPolicy::AllMustSucceed),
            DeploymentEvent::ApplyMixed
        ));
    }

    #[test]
    fn test_aggregate_best_effort_majority() {
        let mut results = HashMap::new();
        results.insert(TargetId::new_v4(), ApplyOutcome::Success);
        results.insert(TargetId::new_v4(), ApplyOutcome::Success);
        results.insert(TargetId::new_v4(), ApplyOutcome::Timeout);

        assert!(matches!(
            aggregate(&results, AggregationPolicy::BestEffortMajority),
            DeploymentEvent::ApplySucceeded
        ));

        // An exact half is not a majority.
        results.insert(TargetId::new_v4(), ApplyOutcome::Timeout);
        assert!(matches!(
            aggregate(&results, AggregationPolicy::BestEffortMajority),
            DeploymentEvent::ApplyMixed
        ));
    }
}
