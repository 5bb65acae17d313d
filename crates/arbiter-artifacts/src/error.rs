//! Artifact store failure modes.

use thiserror::Error;

/// Failures the artifact store surfaces to callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArtifactError {
    /// The artifact id doesn't match `^art_[0-9a-f]{64}$`.
    #[error("invalid artifact id: {0}")]
    InvalidRequest(String),

    /// No metadata file exists for this artifact id.
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Metadata exists but the payload file is missing.
    #[error("artifact payload missing for {0}")]
    DataCorruption(String),

    /// Underlying filesystem failure.
    #[error("artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or payload failed to (de)serialize.
    #[error("artifact store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
