pub mod deployment;
pub mod target;

pub use deployment::{
    ArtifactRef, DeploymentRequest, RollbackOutcome, RollbackRecord, RollbackTrigger,
};
pub use target::{ClusterTarget, ProbeOutcome};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type DeploymentId = Uuid;
pub type TargetId = Uuid;
pub type RollbackId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Pending,
    Approved,
    Rejected,
    Syncing,
    Healthy,
    Degraded,
    Failed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Approved => "approved",
            DeploymentState::Rejected => "rejected",
            DeploymentState::Syncing => "syncing",
            DeploymentState::Healthy => "healthy",
            DeploymentState::Degraded => "degraded",
            DeploymentState::Failed => "failed",
            DeploymentState::RollingBack => "rolling_back",
            DeploymentState::RolledBack => "rolled_back",
            DeploymentState::RollbackFailed => "rollback_failed",
        }
    }

    /// Terminal states accept no further orchestration events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Rejected
                | DeploymentState::RolledBack
                | DeploymentState::RollbackFailed
        )
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentState::Pending),
            "approved" => Ok(DeploymentState::Approved),
            "rejected" => Ok(DeploymentState::Rejected),
            "syncing" => Ok(DeploymentState::Syncing),
            "healthy" => Ok(DeploymentState::Healthy),
            "degraded" => Ok(DeploymentState::Degraded),
            "failed" => Ok(DeploymentState::Failed),
            "rolling_back" => Ok(DeploymentState::RollingBack),
            "rolled_back" => Ok(DeploymentState::RolledBack),
            "rollback_failed" => Ok(DeploymentState::RollbackFailed),
            other => Err(format!("unknown deployment state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Up,
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HealthStatus::Up => "up",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one apply call against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Success,
    TransientError { detail: String },
    ConfigurationError { detail: String },
    Timeout,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Success)
    }

    /// Only the network/transient classes are eligible for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::TransientError { .. } | ApplyOutcome::Timeout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Every target must apply successfully for the deployment to be healthy.
    #[default]
    AllMustSucceed,
    /// A strict majority of successful targets counts as healthy.
    BestEffortMajority,
}
