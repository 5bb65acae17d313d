//! Audit sinks: where events go once they're drained from the queue.

use crate::error::AuditError;
use arbiter_types::AuditEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// Something an [`AuditEvent`] can be written to.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist (or otherwise consume) one event.
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditError>;

    /// A short name for logging which sink failed.
    fn name(&self) -> &str;
}

/// Writes one JSONL file per UTC day under `dir`, named
/// `audit-YYYY-MM-DD.jsonl`. Opens and appends on every write; the OS
/// page cache makes this cheap enough for an audit-volume workload.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Create a sink writing under `dir`, creating it lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for_today(&self) -> PathBuf {
        let day = Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("audit-{day}.jsonl"))
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let path = self.path_for_today();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// An in-memory ring buffer of recent events, read by the stream
/// fanout subsystem for replay-on-subscribe.
pub struct MemoryRingSink {
    buffer: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemoryRingSink {
    /// Create a ring buffer holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot the currently buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.buffer
            .lock()
            .expect("ring sink mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryRingSink {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut guard = self.buffer.lock().expect("ring sink mutex poisoned");
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory_ring"
    }
}

/// Fans one event out to several sinks. A failure in one sink is
/// logged and does not stop delivery to the others.
pub struct CompositeSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl CompositeSink {
    /// Build a composite over the given sinks, in delivery order.
    pub fn new(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for CompositeSink {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditError> {
        for sink in &self.sinks {
            if let Err(err) = sink.write(event).await {
                tracing::warn!(sink = sink.name(), error = %err, "audit sink write failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "composite"
    }
}
