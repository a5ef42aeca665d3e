use thiserror::Error;

use crate::types::{DeploymentId, DeploymentState};

/// Error taxonomy for orchestration operations. Validation and transition
/// errors are rejected before any state change; conflicts and in-progress
/// rollbacks are rejected without escalation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: DeploymentState, event: String },

    #[error("conflicting operation in flight for deployment {0}")]
    ConflictingOperation(DeploymentId),

    #[error("rollback already in progress for deployment {0}")]
    RollbackAlreadyInProgress(DeploymentId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = OrchestratorError::InvalidTransition {
            from: DeploymentState::Rejected,
            event: "approved".to_string(),
        };
        assert_eq!(err.to_string(), "invalid transition from rejected on approved");
    }

    #[test]
    fn test_storage_error_wraps_anyhow() {
        let err: OrchestratorError = anyhow::anyhow!("disk gone").into();
        assert!(matches!(err, OrchestratorError::Storage(_)));
    }
}
