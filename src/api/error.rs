use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::OrchestratorError;

pub struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::InvalidTransition { .. }
            | OrchestratorError::ConflictingOperation(_)
            | OrchestratorError::RollbackAlreadyInProgress(_) => StatusCode::CONFLICT,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
