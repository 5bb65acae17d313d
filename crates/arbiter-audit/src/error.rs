//! Sink-level failure type.
//!
//! The pipeline's public surface (`enqueue`) never fails — a full queue
//! drops its oldest entry instead. [`AuditError`] exists for
//! the boundary underneath that: a sink's write can fail, and when it
//! does the pipeline logs it and keeps draining rather than propagating
//! it to whichever subsystem produced the event.

use thiserror::Error;

/// A failure writing an audit event to a sink.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuditError {
    /// The file sink could not write or rotate its day-partitioned log.
    #[error("audit file sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The event could not be serialized to JSON.
    #[error("audit event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A sink-specific failure not covered above.
    #[error("audit sink error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
