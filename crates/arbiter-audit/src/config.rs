//! Audit pipeline configuration.

use crate::redaction::RedactionMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_max_queue_len() -> usize {
    10_000
}

fn default_debug_char_limit() -> usize {
    500
}

fn default_max_payload_bytes() -> usize {
    32 * 1024
}

fn default_ring_capacity() -> usize {
    1_000
}

/// Configuration for the audit pipeline: queue sizing, redaction mode,
/// and where events are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum number of events buffered before the oldest is dropped.
    pub max_queue_len: usize,
    /// Redaction mode applied to every event's payload before it is
    /// written to any sink.
    pub redaction_mode: RedactionMode,
    /// Character limit for string truncation in [`RedactionMode::Debug`].
    pub debug_char_limit: usize,
    /// Byte cap on a redacted payload's serialized form before it is
    /// replaced wholesale with a truncation marker.
    pub max_payload_bytes: usize,
    /// Directory under which day-partitioned JSONL files are written.
    /// `None` disables the file sink (tests typically run without one).
    pub log_dir: Option<PathBuf>,
    /// Capacity of the in-memory ring buffer used to feed the stream
    /// fanout subsystem.
    pub ring_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_queue_len: default_max_queue_len(),
            redaction_mode: RedactionMode::Debug,
            debug_char_limit: default_debug_char_limit(),
            max_payload_bytes: default_max_payload_bytes(),
            log_dir: None,
            ring_capacity: default_ring_capacity(),
        }
    }
}

impl AuditConfig {
    /// Clamp fields to sane floors so a zeroed or malformed config
    /// still behaves.
    pub fn resolve(mut self) -> Self {
        if self.max_queue_len == 0 {
            self.max_queue_len = default_max_queue_len();
        }
        if self.debug_char_limit == 0 {
            self.debug_char_limit = default_debug_char_limit();
        }
        if self.max_payload_bytes == 0 {
            self.max_payload_bytes = default_max_payload_bytes();
        }
        if self.ring_capacity == 0 {
            self.ring_capacity = default_ring_capacity();
        }
        self
    }
}
