use serde::{Deserialize, Serialize};
use chrono::Utc;

use crate::error::OrchestratorError;
use crate::types::{DeploymentRequest, DeploymentState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeploymentEvent {
    Approved { actor: String },
    Rejected { reason: String },
    SyncStarted,
    ApplySucceeded,
    ApplyFailed,
    ApplyMixed,
    RollbackStarted,
    RollbackSucceeded,
    RollbackFailed,
}

impl DeploymentEvent {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentEvent::Approved { .. } => "approved",
            DeploymentEvent::Rejected { .. } => "rejected",
            DeploymentEvent::SyncStarted => "sync_started",
            DeploymentEvent::ApplySucceeded => "apply_succeeded",
            DeploymentEvent::ApplyFailed => "apply_failed",
            DeploymentEvent::ApplyMixed => "apply_mixed",
            DeploymentEvent::RollbackStarted => "rollback_started",
            DeploymentEvent::RollbackSucceeded => "rollback_succeeded",
            DeploymentEvent::RollbackFailed => "rollback_failed",
        }
    }
}

pub struct DeploymentStateMachine;

impl DeploymentStateMachine {
    /// The fixed table of legal (from, to) pairs. Everything else is rejected.
    pub fn is_legal(from: DeploymentState, to: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (from, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Syncing)
                | (Syncing, Healthy)
                | (Syncing, Degraded)
                | (Syncing, Failed)
                | (Healthy, RollingBack)
                | (Degraded, RollingBack)
                | (Failed, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackFailed)
        )
    }

    /// Apply an event to a deployment, mutating its state on success. An
    /// event that has no legal target state for the current state is
    /// rejected and the deployment is left untouched.
    pub fn transition(
        deployment: &mut DeploymentRequest,
        event: DeploymentEvent,
    ) -> Result<DeploymentState, OrchestratorError> {
        use DeploymentState::*;

        let new_state = match (deployment.state, &event) {
            (Pending, DeploymentEvent::Approved { .. }) => Approved,
            (Pending, DeploymentEvent::Rejected { .. }) => Rejected,
            (Approved, DeploymentEvent::SyncStarted) => Syncing,
            (Syncing, DeploymentEvent::ApplySucceeded) => Healthy,
            (Syncing, DeploymentEvent::ApplyFailed) => Failed,
            (Syncing, DeploymentEvent::ApplyMixed) => Degraded,
            (Healthy | Degraded | Failed, DeploymentEvent::RollbackStarted) => RollingBack,
            (RollingBack, DeploymentEvent::RollbackSucceeded) => RolledBack,
            (RollingBack, DeploymentEvent::RollbackFailed) => RollbackFailed,
            _ => {
                return Err(OrchestratorError::InvalidTransition {
                    from: deployment.state,
                    event: event.as_str().to_string(),
                });
            }
        };

        debug_assert!(Self::is_legal(deployment.state, new_state));

        match &event {
            DeploymentEvent::Rejected { reason } => {
                deployment.status_detail = Some(reason.clone());
            }
            DeploymentEvent::Approved { actor } => {
                deployment.status_detail = Some(format!("approved by {actor}"));
            }
            _ => {}
        }

        deployment.state = new_state;
        deployment.updated_at = Utc::now();
        Ok(new_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AggregationPolicy, ArtifactRef, TargetId};

    fn create_test_deployment() -> DeploymentRequest {
        DeploymentRequest::new(
            ArtifactRef::new("api", "1.2.0"),
            vec![TargetId::new_v4()],
            "alice",
            Some(ArtifactRef::new("api", "1.1.0")),
            AggregationPolicy::default(),
        )
    }

    fn all_states() -> Vec<DeploymentState> {
        use DeploymentState::*;
        vec![
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
        ]
    }

    fn all_events() -> Vec<DeploymentEvent> {
        vec![
            DeploymentEvent::Approved {
                actor: "alice".to_string(),
            },
            DeploymentEvent::Rejected {
                reason: "no".to_string(),
            },
            DeploymentEvent::SyncStarted,
            DeploymentEvent::ApplySucceeded,
            DeploymentEvent::ApplyFailed,
            DeploymentEvent::ApplyMixed,
            DeploymentEvent::RollbackStarted,
            DeploymentEvent::RollbackSucceeded,
            DeploymentEvent::RollbackFailed,
        ]
    }

    #[test]
    fn test_pending_to_approved() {
        let mut dep = create_test_deployment();
        let state = DeploymentStateMachine::transition(
            &mut dep,
            DeploymentEvent::Approved {
                actor: "alice".to_string(),
            },
        )
        .unwrap();
        assert_eq!(state, DeploymentState::Approved);
    }

    #[test]
    fn test_pending_to_rejected_records_reason() {
        let mut dep = create_test_deployment();
        DeploymentStateMachine::transition(
            &mut dep,
            DeploymentEvent::Rejected {
                reason: "wrong version".to_string(),
            },
        )
        .unwrap();
        assert_eq!(dep.state, DeploymentState::Rejected);
        assert_eq!(dep.status_detail.as_deref(), Some("wrong version"));
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut dep = create_test_deployment();
        dep.state = DeploymentState::Rejected;

        let result = DeploymentStateMachine::transition(
            &mut dep,
            DeploymentEvent::Approved {
                actor: "alice".to_string(),
            },
        );
        assert!(matches!(
            result,
            Err(OrchestratorError::InvalidTransition { .. })
        ));
        assert_eq!(dep.state, DeploymentState::Rejected);
    }

    #[test]
    fn test_syncing_outcomes() {
        for (event, expected) in [
            (DeploymentEvent::ApplySucceeded, DeploymentState::Healthy),
            (DeploymentEvent::ApplyFailed, DeploymentState::Failed),
            (DeploymentEvent::ApplyMixed, DeploymentState::Degraded),
        ] {
            let mut dep = create_test_deployment();
            dep.state = DeploymentState::Syncing;
            DeploymentStateMachine::transition(&mut dep, event).unwrap();
            assert_eq!(dep.state, expected);
        }
    }

    #[test]
    fn test_rollback_path() {
        let mut dep = create_test_deployment();
        dep.state = DeploymentState::Failed;

        DeploymentStateMachine::transition(&mut dep, DeploymentEvent::RollbackStarted).unwrap();
        assert_eq!(dep.state, DeploymentState::RollingBack);

        DeploymentStateMachine::transition(&mut dep, DeploymentEvent::RollbackSucceeded).unwrap();
        assert_eq!(dep.state, DeploymentState::RolledBack);
    }

    #[test]
    fn test_rollback_from_healthy_and_degraded() {
        for from in [DeploymentState::Healthy, DeploymentState::Degraded] {
            let mut dep = create_test_deployment();
            dep.state = from;
            DeploymentStateMachine::transition(&mut dep, DeploymentEvent::RollbackStarted)
                .unwrap();
            assert_eq!(dep.state, DeploymentState::RollingBack);
        }
    }

    #[test]
    fn test_every_reachable_pair_is_in_the_legal_table() {
        // Exhaustively drive every (state, event) pair and assert the machine
        // never lands outside the legal transition table.
        for from in all_states() {
            for event in all_events() {
                let mut dep = create_test_deployment();
                dep.state = from;
                if let Ok(to) = DeploymentStateMachine::transition(&mut dep, event) {
                    assert!(
                        DeploymentStateMachine::is_legal(from, to),
                        "{from} -> {to} escaped the table"
                    );
                } else {
                    assert_eq!(dep.state, from, "failed transition must not mutate state");
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_accept_no_event() {
        for from in all_states().into_iter().filter(|s| s.is_terminal()) {
            for event in all_events() {
                let mut dep = create_test_deployment();
                dep.state = from;
                assert!(DeploymentStateMachine::transition(&mut dep, event).is_err());
            }
        }
    }
}
