//! `artifacts.publish` / `artifacts.fetch` — RPC wrappers over
//! [`arbiter_artifacts`] with input validation.

use crate::gateway::DelegationGateway;
use arbiter_artifacts::{ArtifactKind, ArtifactMetadata, PublishRequest};
use arbiter_types::RpcError;

/// Input to `artifacts.publish`.
#[derive(Debug, Clone)]
pub struct ArtifactsPublishRequest {
    /// Whether `bytes` should be stored as text or JSON.
    pub kind: ArtifactKind,
    /// The raw payload.
    pub bytes: Vec<u8>,
    /// Publishing agent.
    pub creator_agent_id: String,
    /// Trace this publish belongs to.
    pub trace_id: String,
    /// Optional time-to-live, in days.
    pub ttl_days: Option<u32>,
}

impl DelegationGateway {
    /// Validate and publish an artifact.
    pub async fn artifacts_publish(&self, request: ArtifactsPublishRequest, now: i64) -> Result<ArtifactMetadata, RpcError> {
        if request.bytes.is_empty() {
            return Err(RpcError::invalid_request("artifact payload must not be empty"));
        }
        if request.creator_agent_id.trim().is_empty() {
            return Err(RpcError::invalid_request("creatorAgentId must be non-empty"));
        }
        if request.trace_id.trim().is_empty() {
            return Err(RpcError::invalid_request("traceId must be non-empty"));
        }
        if request.ttl_days.is_some_and(|days| days == 0) {
            return Err(RpcError::invalid_request("ttlDays must be positive when present"));
        }

        let publish_request = PublishRequest {
            kind: request.kind,
            bytes: &request.bytes,
            creator_agent_id: &request.creator_agent_id,
            trace_id: &request.trace_id,
            ttl_days: request.ttl_days,
        };
        self.artifacts
            .publish(publish_request, now)
            .await
            .map(|result| result.metadata)
            .map_err(|err| RpcError::internal(err.to_string()))
    }

    /// Validate and fetch an artifact.
    pub async fn artifacts_fetch(&self, id: &str) -> Result<arbiter_artifacts::FetchedArtifact, RpcError> {
        if id.trim().is_empty() {
            return Err(RpcError::invalid_request("artifact id must be non-empty"));
        }
        self.artifacts.fetch(id).await.map_err(|err| match err {
            arbiter_artifacts::ArtifactError::InvalidRequest(msg) => RpcError::invalid_request(msg),
            arbiter_artifacts::ArtifactError::NotFound(msg) => RpcError::not_found(format!("artifact {msg} not found")),
            other => RpcError::internal(other.to_string()),
        })
    }
}
