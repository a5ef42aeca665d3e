use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use crate::clients::{ClusterClient, ProbeResult};
use crate::types::{ApplyOutcome, ArtifactRef, ClusterTarget};

/// HTTP control-plane client. Expects each target endpoint to expose
/// `POST /apply` and `GET /healthz`.
pub struct HttpClusterClient {
    client: reqwest::Client,
}

impl HttpClusterClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn apply(&self, target: &ClusterTarget, artifact: &ArtifactRef) -> ApplyOutcome {
        let response = self
            .client
            .post(format!("{}/apply", target.endpoint))
            .json(&json!({
                "artifact": artifact.name,
                "version": artifact.version,
            }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => ApplyOutcome::Success,
            // 4xx means the control plane rejected the request itself;
            // retrying the same payload cannot help.
            Ok(resp) if resp.status().is_client_error() => ApplyOutcome::ConfigurationError {
                detail: format!("control plane rejected apply: {}", resp.status()),
            },
            Ok(resp) => ApplyOutcome::TransientError {
                detail: format!("control plane returned {}", resp.status()),
            },
            Err(e) if e.is_timeout() => ApplyOutcome::Timeout,
            Err(e) => ApplyOutcome::TransientError {
                detail: e.to_string(),
            },
        }
    }

    async fn probe_health(&self, target: &ClusterTarget) -> ProbeResult {
        let started = Instant::now();
        let response = self
            .client
            .get(format!("{}/healthz", target.endpoint))
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => ProbeResult {
                ok: true,
                latency_ms,
                error: None,
            },
            Ok(resp) => ProbeResult {
                ok: false,
                latency_ms,
                error: Some(format!("status {}", resp.status())),
            },
            Err(e) => ProbeResult {
                ok: false,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }
}
