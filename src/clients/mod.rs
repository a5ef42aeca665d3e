pub mod http;

pub use http::HttpClusterClient;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::notify::OrchestratorEvent;
use crate::types::{ApplyOutcome, ArtifactRef, ClusterTarget};

/// Outcome of one health probe call.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Capability-shaped client for a cluster control plane. The wire protocol
/// behind it is out of scope; implementations classify their own failures
/// into the `ApplyOutcome` variants.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn apply(&self, target: &ClusterTarget, artifact: &ArtifactRef) -> ApplyOutcome;
    async fn probe_health(&self, target: &ClusterTarget) -> ProbeResult;
}

/// Resolved, deployable form of an artifact reference.
#[derive(Debug, Clone)]
pub struct ArtifactDescriptor {
    pub reference: ArtifactRef,
    pub locator: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn resolve(&self, artifact: &ArtifactRef) -> Result<ArtifactDescriptor>;
}

/// Fire-and-forget notification sink. Failures must never block or fail the
/// orchestration path; the outbound queue in `notify` enforces that.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, event: &OrchestratorEvent) -> Result<()>;
}

/// Artifact store that accepts any well-formed reference. Suitable for
/// control planes that resolve artifacts themselves.
pub struct StaticArtifactStore;

#[async_trait]
impl ArtifactStore for StaticArtifactStore {
    async fn resolve(&self, artifact: &ArtifactRef) -> Result<ArtifactDescriptor> {
        if artifact.name.trim().is_empty() || artifact.name.contains(char::is_whitespace) {
            return Err(anyhow!("malformed artifact name: {:?}", artifact.name));
        }
        if artifact.version.trim().is_empty() || artifact.version.contains(char::is_whitespace) {
            return Err(anyhow!("malformed artifact version: {:?}", artifact.version));
        }

        Ok(ArtifactDescriptor {
            reference: artifact.clone(),
            locator: artifact.to_string(),
        })
    }
}
