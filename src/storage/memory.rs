use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::storage::traits::Store;
use crate::types::{
    DeploymentId, DeploymentRequest, DeploymentState, RollbackId, RollbackRecord,
};

#[derive(Clone)]
pub struct InMemoryStore {
    deployments: Arc<RwLock<HashMap<DeploymentId, DeploymentRequest>>>,
    rollbacks: Arc<RwLock<HashMap<RollbackId, RollbackRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            deployments: Arc::new(RwLock::new(HashMap::new())),
            rollbacks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_deployment(&self, deployment: &DeploymentRequest) -> Result<()> {
        let mut deployments = self.deployments.write().unwrap();
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<DeploymentRequest>> {
        let deployments = self.deployments.read().unwrap();
        Ok(deployments.get(&id).cloned())
    }

    async fn update_deployment(&self, deployment: &DeploymentRequest) -> Result<()> {
        let mut deployments = self.deployments.write().unwrap();
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn list_deployments(
        &self,
        state: Option<DeploymentState>,
    ) -> Result<Vec<DeploymentRequest>> {
        let deployments = self.deployments.read().unwrap();
        Ok(deployments
            .values()
            .filter(|d| state.map(|s| d.state == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn create_rollback_record(&self, record: &RollbackRecord) -> Result<()> {
        let mut rollbacks = self.rollbacks.write().unwrap();
        rollbacks.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_rollback_record(&self, record: &RollbackRecord) -> Result<()> {
        let mut rollbacks = self.rollbacks.write().unwrap();
        rollbacks.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_rollback_record(&self, id: RollbackId) -> Result<Option<RollbackRecord>> {
        let rollbacks = self.rollbacks.read().unwrap();
        Ok(rollbacks.get(&id).cloned())
    }

    async fn list_rollback_records(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Vec<RollbackRecord>> {
        let rollbacks = self.rollbacks.read().unwrap();
        Ok(rollbacks
            .values()
            .filter(|r| r.deployment_id == deployment_id)
            .cloned()
            .collect())
    }
}
