use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::error::OrchestratorError;
use crate::health::aggregator::UptimeStats;
use crate::orchestrator::{Orchestrator, SubmitRequest};
use crate::types::{
    AggregationPolicy, ApplyOutcome, ArtifactRef, ClusterTarget, DeploymentRequest,
    RollbackRecord, TargetId,
};

#[derive(Deserialize)]
pub struct SubmitDeploymentRequest {
    pub artifact: ArtifactRef,
    pub targets: Vec<TargetId>,
    pub requested_by: String,
    #[serde(default)]
    pub prior_version: Option<ArtifactRef>,
    #[serde(default)]
    pub policy: Option<AggregationPolicy>,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct RegisterTargetRequest {
    pub name: String,
    pub endpoint: String,
}

#[derive(Deserialize)]
pub struct ListDeploymentsQuery {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct UptimeQuery {
    #[serde(default)]
    pub window_secs: Option<i64>,
}

#[derive(Serialize)]
pub struct DeploymentResponse {
    pub id: Uuid,
    pub artifact: ArtifactRef,
    pub targets: Vec<TargetId>,
    pub requested_by: String,
    pub state: String,
    pub prior_version: Option<ArtifactRef>,
    pub apply_results: HashMap<TargetId, ApplyOutcome>,
    pub status_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeploymentRequest> for DeploymentResponse {
    fn from(deployment: DeploymentRequest) -> Self {
        Self {
            id: deployment.id,
            artifact: deployment.artifact,
            targets: deployment.targets,
            requested_by: deployment.requested_by,
            state: deployment.state.as_str().to_string(),
            prior_version: deployment.prior_version,
            apply_results: deployment.apply_results,
            status_detail: deployment.status_detail,
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct TargetResponse {
    pub id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub reachable: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<ClusterTarget> for TargetResponse {
    fn from(target: ClusterTarget) -> Self {
        Self {
            id: target.id,
            name: target.name,
            endpoint: target.endpoint,
            reachable: target.reachable,
            last_seen: target.last_seen,
        }
    }
}

#[derive(Serialize)]
pub struct TargetHealthResponse {
    pub id: Uuid,
    pub status: String,
}

#[derive(Serialize)]
pub struct RollbackResponse {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub reverted_to: ArtifactRef,
    pub outcome: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<RollbackRecord> for RollbackResponse {
    fn from(record: RollbackRecord) -> Self {
        let outcome = match record.outcome {
            crate::types::RollbackOutcome::InFlight => "in_flight",
            crate::types::RollbackOutcome::Succeeded => "succeeded",
            crate::types::RollbackOutcome::Failed => "failed",
        };
        Self {
            id: record.id,
            deployment_id: record.deployment_id,
            reverted_to: record.reverted_to,
            outcome: outcome.to_string(),
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn register_target(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<RegisterTargetRequest>,
) -> Result<Json<TargetResponse>, ApiError> {
    if request.name.trim().is_empty() || request.endpoint.trim().is_empty() {
        return Err(OrchestratorError::Validation(
            "target name and endpoint are required".to_string(),
        )
        .into());
    }

    let target = orchestrator
        .registry()
        .register(ClusterTarget::new(request.name, request.endpoint));
    Ok(Json(TargetResponse::from(target)))
}

pub async fn list_targets(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Json<Vec<TargetResponse>> {
    Json(
        orchestrator
            .registry()
            .list()
            .into_iter()
            .map(TargetResponse::from)
            .collect(),
    )
}

pub async fn get_target_health(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TargetHealthResponse>, ApiError> {
    let status = orchestrator.target_health(&id)?;
    Ok(Json(TargetHealthResponse {
        id,
        status: status.as_str().to_string(),
    }))
}

pub async fn get_target_uptime(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Query(query): Query<UptimeQuery>,
) -> Result<Json<UptimeStats>, ApiError> {
    let window = query.window_secs.map(Duration::seconds);
    let stats = orchestrator.uptime(&id, window)?;
    Ok(Json(stats))
}

pub async fn submit_deployment(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<SubmitDeploymentRequest>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let deployment = orchestrator
        .submit(SubmitRequest {
            artifact: request.artifact,
            targets: request.targets,
            requested_by: request.requested_by,
            prior_version: request.prior_version,
            policy: request.policy,
        })
        .await?;
    Ok(Json(DeploymentResponse::from(deployment)))
}

pub async fn list_deployments(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<ListDeploymentsQuery>,
) -> Result<Json<Vec<DeploymentResponse>>, ApiError> {
    let state = match query.state.as_deref() {
        Some(raw) => Some(
            raw.parse()
                .map_err(|e: String| OrchestratorError::Validation(e))?,
        ),
        None => None,
    };

    let deployments = orchestrator.list(state).await?;
    Ok(Json(
        deployments.into_iter().map(DeploymentResponse::from).collect(),
    ))
}

pub async fn get_deployment(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let deployment = orchestrator.status(id).await?;
    Ok(Json(DeploymentResponse::from(deployment)))
}

pub async fn approve_deployment(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let deployment = orchestrator.approve(id, &request.actor).await?;
    Ok(Json(DeploymentResponse::from(deployment)))
}

pub async fn reject_deployment(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let deployment = orchestrator.reject(id, &request.reason).await?;
    Ok(Json(DeploymentResponse::from(deployment)))
}

pub async fn rollback_deployment(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<RollbackResponse>, ApiError> {
    let record = orchestrator.manual_rollback(id, &request.actor).await?;
    Ok(Json(RollbackResponse::from(record)))
}

pub async fn list_rollbacks(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RollbackResponse>>, ApiError> {
    let records = orchestrator.rollback_history(id).await?;
    Ok(Json(records.into_iter().map(RollbackResponse::from).collect()))
}
