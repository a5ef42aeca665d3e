use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{
    AggregationPolicy, ApplyOutcome, DeploymentId, DeploymentState, RollbackId, TargetId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub version: String,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// A single rollout request. Owned by the state machine: everything except
/// `state`, `apply_results`, `status_detail` and `updated_at` is immutable
/// after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub id: DeploymentId,
    pub artifact: ArtifactRef,
    pub targets: Vec<TargetId>,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: DeploymentState,
    /// Known-good version a rollback reverts to.
    pub prior_version: Option<ArtifactRef>,
    pub policy: AggregationPolicy,
    /// Per-target results of the most recent fan-out.
    pub apply_results: HashMap<TargetId, ApplyOutcome>,
    pub status_detail: Option<String>,
}

impl DeploymentRequest {
    pub fn new(
        artifact: ArtifactRef,
        targets: Vec<TargetId>,
        requested_by: impl Into<String>,
        prior_version: Option<ArtifactRef>,
        policy: AggregationPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::new_v4(),
            artifact,
            targets,
            requested_by: requested_by.into(),
            created_at: now,
            updated_at: now,
            state: DeploymentState::Pending,
            prior_version,
            policy,
            apply_results: HashMap::new(),
            status_detail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackTrigger {
    Manual { actor: String },
    Automatic { target: TargetId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    InFlight,
    Succeeded,
    Failed,
}

/// One rollback attempt. At most one may be in flight per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub id: RollbackId,
    pub deployment_id: DeploymentId,
    pub reverted_to: ArtifactRef,
    pub trigger: RollbackTrigger,
    pub outcome: RollbackOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RollbackRecord {
    pub fn new(
        deployment_id: DeploymentId,
        reverted_to: ArtifactRef,
        trigger: RollbackTrigger,
    ) -> Self {
        Self {
            id: RollbackId::new_v4(),
            deployment_id,
            reverted_to,
            trigger,
            outcome: RollbackOutcome::InFlight,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, outcome: RollbackOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_deployment_is_pending() {
        let dep = DeploymentRequest::new(
            ArtifactRef::new("api", "1.2.0"),
            vec![TargetId::new_v4()],
            "alice",
            None,
            AggregationPolicy::default(),
        );
        assert_eq!(dep.state, DeploymentState::Pending);
        assert!(dep.apply_results.is_empty());
        assert_eq!(dep.policy, AggregationPolicy::AllMustSucceed);
    }

    #[test]
    fn test_rollback_record_finish() {
        let mut record = RollbackRecord::new(
            DeploymentId::new_v4(),
            ArtifactRef::new("api", "1.1.0"),
            RollbackTrigger::Manual {
                actor: "bob".to_string(),
            },
        );
        assert_eq!(record.outcome, RollbackOutcome::InFlight);
        assert!(record.finished_at.is_none());

        record.finish(RollbackOutcome::Succeeded);
        assert_eq!(record.outcome, RollbackOutcome::Succeeded);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_artifact_ref_display() {
        let artifact = ArtifactRef::new("api", "1.2.0");
        assert_eq!(artifact.to_string(), "api:1.2.0");
    }
}
