use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TargetId;

/// A reachable execution cluster the orchestrator can deploy to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTarget {
    pub id: TargetId,
    pub name: String,
    pub endpoint: String,
    pub reachable: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ClusterTarget {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: TargetId::new_v4(),
            name: name.into(),
            endpoint: endpoint.into(),
            reachable: true,
            last_seen: None,
        }
    }
}

/// Raw result of one health probe against one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub target_id: TargetId,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: u64,
    pub error_class: Option<String>,
}

impl ProbeOutcome {
    pub fn success(target_id: TargetId, latency_ms: u64) -> Self {
        Self {
            target_id,
            timestamp: Utc::now(),
            success: true,
            latency_ms,
            error_class: None,
        }
    }

    pub fn failure(target_id: TargetId, latency_ms: u64, error_class: impl Into<String>) -> Self {
        Self {
            target_id,
            timestamp: Utc::now(),
            success: false,
            latency_ms,
            error_class: Some(error_class.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_target_is_reachable() {
        let target = ClusterTarget::new("east-1", "http://east-1.example.com");
        assert!(target.reachable);
        assert!(target.last_seen.is_none());
    }

    #[test]
    fn test_probe_outcome_constructors() {
        let id = TargetId::new_v4();
        let ok = ProbeOutcome::success(id, 12);
        assert!(ok.success);
        assert!(ok.error_class.is_none());

        let bad = ProbeOutcome::failure(id, 30_000, "timeout");
        assert!(!bad.success);
        assert_eq!(bad.error_class.as_deref(), Some("timeout"));
    }
}
