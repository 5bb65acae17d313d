//! The artifact store: publish, fetch, handoff briefs, and
//! long-payload auto-compaction.

use crate::error::ArtifactError;
use crate::id::{compute_id, is_valid_id};
use crate::types::{
    ArtifactKind, ArtifactMetadata, FetchedArtifact, HandoffBrief, PublishResult,
    ARTIFACT_SCHEMA_VERSION,
};
use std::path::{Path, PathBuf};

/// Everything the caller must supply to publish a payload.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    /// Whether the payload is stored as text or JSON.
    pub kind: ArtifactKind,
    /// The raw payload bytes.
    pub bytes: &'a [u8],
    /// Agent that produced this artifact.
    pub creator_agent_id: &'a str,
    /// Trace the artifact is published under.
    pub trace_id: &'a str,
    /// Time-to-live in days, if any.
    pub ttl_days: Option<u32>,
}

/// Default character threshold above which a payload is auto-published
/// and replaced with a stub message.
pub const DEFAULT_AUTO_PUBLISH_THRESHOLD: usize = 2000;
/// The lowest threshold callers may configure.
pub const AUTO_PUBLISH_THRESHOLD_FLOOR: usize = 200;

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// A content-addressed filesystem artifact store.
pub struct ArtifactStore {
    root: PathBuf,
    briefs_dir: PathBuf,
}

impl ArtifactStore {
    /// Build a store rooted at `root`, writing handoff briefs under
    /// `briefs_dir`.
    pub fn new(root: impl Into<PathBuf>, briefs_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            briefs_dir: briefs_dir.into(),
        }
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.meta.json"))
    }

    fn payload_path(&self, id: &str, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Text => self.root.join(format!("{id}.txt")),
            ArtifactKind::Json => self.root.join(format!("{id}.json")),
        }
    }

    /// Publish a payload. Idempotent: if metadata for the computed id
    /// already exists, it is returned unchanged without rewriting any
    /// file.
    pub async fn publish(
        &self,
        request: PublishRequest<'_>,
        now: i64,
    ) -> Result<PublishResult, ArtifactError> {
        let id = compute_id(request.bytes);
        let meta_path = self.meta_path(&id);
        if let Some(existing) = self.read_metadata(&meta_path).await? {
            return Ok(PublishResult {
                metadata: existing,
                created: false,
            });
        }

        let payload_path = self.payload_path(&id, request.kind);
        if !tokio::fs::try_exists(&payload_path).await.unwrap_or(false) {
            atomic_write(&payload_path, request.bytes).await?;
        }

        let metadata = ArtifactMetadata {
            id: id.clone(),
            kind: request.kind,
            created_at: now,
            content_length: request.bytes.len(),
            creator_agent_id: request.creator_agent_id.to_string(),
            trace_id: request.trace_id.to_string(),
            ttl_days: request.ttl_days,
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
        };
        atomic_write(&meta_path, serde_json::to_vec_pretty(&metadata)?.as_slice()).await?;

        Ok(PublishResult { metadata, created: true })
    }

    async fn read_metadata(&self, meta_path: &Path) -> Result<Option<ArtifactMetadata>, ArtifactError> {
        match tokio::fs::read(meta_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch an artifact by id, parsing its payload according to its
    /// stored kind.
    pub async fn fetch(&self, id: &str) -> Result<FetchedArtifact, ArtifactError> {
        if !is_valid_id(id) {
            return Err(ArtifactError::InvalidRequest(id.to_string()));
        }
        let meta_path = self.meta_path(id);
        let metadata = self
            .read_metadata(&meta_path)
            .await?
            .ok_or_else(|| ArtifactError::NotFound(id.to_string()))?;

        let candidates = [
            self.payload_path(id, metadata.kind),
            self.root.join(format!("{id}.txt")),
            self.root.join(format!("{id}.json")),
        ];
        let mut bytes = None;
        for candidate in candidates {
            if let Ok(found) = tokio::fs::read(&candidate).await {
                bytes = Some(found);
                break;
            }
        }
        let bytes = bytes.ok_or_else(|| ArtifactError::DataCorruption(id.to_string()))?;

        let payload = match metadata.kind {
            ArtifactKind::Json => serde_json::from_slice(&bytes)?,
            ArtifactKind::Text => {
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        };

        Ok(FetchedArtifact { metadata, payload })
    }

    /// Write a handoff brief summarizing a compaction, as
    /// `<trace>-<from>-to-<to>.json` under the briefs directory.
    pub async fn write_handoff_brief(&self, brief: &HandoffBrief) -> Result<PathBuf, ArtifactError> {
        let path = self.briefs_dir.join(format!(
            "{}-{}-to-{}.json",
            brief.trace_id, brief.from_agent_id, brief.to_agent_id
        ));
        atomic_write(&path, serde_json::to_vec_pretty(brief)?.as_slice()).await?;
        Ok(path)
    }

    /// If `message`'s length exceeds `threshold` (clamped to at least
    /// [`AUTO_PUBLISH_THRESHOLD_FLOOR`]), publish it as a text
    /// artifact, write a handoff brief, and return the stub message
    /// plus artifact id. Otherwise returns `None` and the caller should
    /// send `message` unmodified.
    pub async fn maybe_auto_publish_long_payload(
        &self,
        message: &str,
        trace_id: &str,
        from_agent_id: &str,
        to_agent_id: &str,
        threshold: Option<usize>,
        now: i64,
    ) -> Result<Option<(String, String)>, ArtifactError> {
        let threshold = threshold.unwrap_or(DEFAULT_AUTO_PUBLISH_THRESHOLD).max(AUTO_PUBLISH_THRESHOLD_FLOOR);
        if message.chars().count() <= threshold {
            return Ok(None);
        }
        let publish = self
            .publish(
                PublishRequest {
                    kind: ArtifactKind::Text,
                    bytes: message.as_bytes(),
                    creator_agent_id: from_agent_id,
                    trace_id,
                    ttl_days: None,
                },
                now,
            )
            .await?;
        let stub = format!(
            "[compacted: original message was {} chars, see artifact {}]",
            message.chars().count(),
            publish.metadata.id
        );
        self.write_handoff_brief(&HandoffBrief {
            trace_id: trace_id.to_string(),
            from_agent_id: from_agent_id.to_string(),
            to_agent_id: to_agent_id.to_string(),
            artifact_id: publish.metadata.id.clone(),
            original_length: message.chars().count(),
            stub_message: stub.clone(),
            created_at: now,
        })
        .await?;
        Ok(Some((stub, publish.metadata.id)))
    }
}
