//! # arbiter-audit — redaction, bounded queueing, and persistence
//!
//! Every subsystem in the control plane produces [`arbiter_types::AuditEventInput`]
//! values; this crate is where they become durable, redacted
//! [`arbiter_types::AuditEvent`] records. The pipeline never blocks or fails a
//! producer — a full queue drops its oldest entry, and a failing sink
//! is logged and skipped rather than propagated.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod redaction;
pub mod sink;

pub use config::AuditConfig;
pub use error::AuditError;
pub use pipeline::AuditPipeline;
pub use queue::DropOldestQueue;
pub use redaction::{enforce_payload_cap, redact_payload, HashedValue, RedactionMode};
pub use sink::{AuditSink, CompositeSink, FileSink, MemoryRingSink};
