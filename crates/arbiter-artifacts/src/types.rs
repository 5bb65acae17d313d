//! Artifact and handoff-brief record shapes.

use serde::{Deserialize, Serialize};

/// Whether an artifact's payload is stored as plain text or as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Stored as a raw UTF-8 text file.
    Text,
    /// Stored as a JSON document.
    Json,
}

/// Schema version stamped on every artifact metadata record.
pub const ARTIFACT_SCHEMA_VERSION: &str = "1.0";

/// Metadata persisted alongside an artifact's payload file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    /// `art_` + hex SHA-256 of the payload bytes.
    pub id: String,
    /// Whether the payload is text or JSON.
    pub kind: ArtifactKind,
    /// Milliseconds since epoch when this artifact was first published.
    pub created_at: i64,
    /// Length of the payload in bytes.
    pub content_length: usize,
    /// Agent that produced this artifact.
    pub creator_agent_id: String,
    /// Trace the artifact was published under.
    pub trace_id: String,
    /// Time-to-live in days, if the caller supplied one.
    pub ttl_days: Option<u32>,
    /// Schema version of this metadata record.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

fn default_schema_version() -> String {
    ARTIFACT_SCHEMA_VERSION.to_string()
}

/// The result of a publish call: the metadata, plus whether this
/// publish created new files or returned an existing record unchanged.
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// The artifact's metadata.
    pub metadata: ArtifactMetadata,
    /// `true` if this call wrote new files; `false` if the artifact
    /// already existed and was returned unchanged (idempotent replay).
    pub created: bool,
}

/// A fetched artifact: its metadata plus the parsed payload.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    /// The artifact's metadata.
    pub metadata: ArtifactMetadata,
    /// The payload — a JSON value for [`ArtifactKind::Json`], a plain
    /// string value for [`ArtifactKind::Text`].
    pub payload: serde_json::Value,
}

/// A handoff brief summarizing a long-payload compaction between two
/// agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffBrief {
    /// Trace the handoff belongs to.
    pub trace_id: String,
    /// Agent handing off.
    pub from_agent_id: String,
    /// Agent receiving the handoff.
    pub to_agent_id: String,
    /// Artifact id holding the full original payload.
    pub artifact_id: String,
    /// Length of the original payload, in characters.
    pub original_length: usize,
    /// Short stub message left in place of the full payload.
    pub stub_message: String,
    /// Milliseconds since epoch when the brief was written.
    pub created_at: i64,
}
