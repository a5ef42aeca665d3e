use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    DeploymentId, DeploymentRequest, DeploymentState, RollbackId, RollbackRecord,
};

/// Persistence seam for the orchestrator's entities. The core only requires
/// that each write lands atomically per transition; schema and durability
/// belong to the implementation.
#[async_trait]
pub trait Store: Send + Sync {
    // Deployment operations
    async fn create_deployment(&self, deployment: &DeploymentRequest) -> Result<()>;
    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<DeploymentRequest>>;
    async fn update_deployment(&self, deployment: &DeploymentRequest) -> Result<()>;
    async fn list_deployments(
        &self,
        state: Option<DeploymentState>,
    ) -> Result<Vec<DeploymentRequest>>;

    // Rollback records
    async fn create_rollback_record(&self, record: &RollbackRecord) -> Result<()>;
    async fn update_rollback_record(&self, record: &RollbackRecord) -> Result<()>;
    async fn get_rollback_record(&self, id: RollbackId) -> Result<Option<RollbackRecord>>;
    async fn list_rollback_records(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Vec<RollbackRecord>>;
}
