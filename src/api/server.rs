use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/targets", post(handlers::register_target))
        .route("/targets", get(handlers::list_targets))
        .route("/targets/:id/health", get(handlers::get_target_health))
        .route("/targets/:id/uptime", get(handlers::get_target_uptime))
        .route("/deployments", post(handlers::submit_deployment))
        .route("/deployments", get(handlers::list_deployments))
        .route("/deployments/:id", get(handlers::get_deployment))
        .route("/deployments/:id/approve", post(handlers::approve_deployment))
        .route("/deployments/:id/reject", post(handlers::reject_deployment))
        .route("/deployments/:id/rollback", post(handlers::rollback_deployment))
        .route("/deployments/:id/rollbacks", get(handlers::list_rollbacks))
        .layer(CorsLayer::permissive())
        .with_state(state.orchestrator)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!("Windlass API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
