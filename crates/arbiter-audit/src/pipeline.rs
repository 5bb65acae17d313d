//! Wiring: event materialization, the bounded queue, and the single
//! drain task that redacts and persists.

use crate::config::AuditConfig;
use crate::queue::DropOldestQueue;
use crate::redaction::{enforce_payload_cap, redact_payload};
use crate::sink::AuditSink;
use arbiter_types::{AuditEvent, AuditEventInput, EVENT_VERSION, SCHEMA_VERSION};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Fill in the fields the caller doesn't have to supply: schema/event
/// version, timestamp, and a default agent id.
fn materialize(input: AuditEventInput) -> AuditEvent {
    AuditEvent {
        schema_version: SCHEMA_VERSION.to_string(),
        event_version: EVENT_VERSION,
        timestamp: input.timestamp.unwrap_or_else(now_millis),
        trace_id: input.trace_id.unwrap_or_else(|| "unknown".into()),
        span_id: input.span_id,
        agent_id: input.agent_id.unwrap_or_else(|| "unknown".into()),
        event_type: input.event_type.unwrap_or_else(|| "unknown".to_string()),
        risk_tier: input.risk_tier,
        decision: input.decision,
        model: input.model,
        tool: input.tool,
        metrics: input.metrics,
        payload: input.payload.unwrap_or_else(|| serde_json::json!({})),
    }
}

/// The audit pipeline: accepts events from anywhere in the process,
/// never blocks or fails the caller, and drains to a sink on a single
/// background task.
pub struct AuditPipeline {
    config: AuditConfig,
    queue: Arc<DropOldestQueue<AuditEvent>>,
    sink: Arc<dyn AuditSink>,
    started: AtomicBool,
    drain_task: Mutex<Option<JoinHandle<()>>>,
}

impl AuditPipeline {
    /// Build a pipeline over the given sink. Call [`Self::start`] once
    /// to begin draining.
    pub fn new(config: AuditConfig, sink: Arc<dyn AuditSink>) -> Self {
        let config = config.resolve();
        Self {
            queue: Arc::new(DropOldestQueue::new(config.max_queue_len)),
            config,
            sink,
            started: AtomicBool::new(false),
            drain_task: Mutex::new(None),
        }
    }

    /// Enqueue an event for redaction and persistence. Never blocks;
    /// drops the oldest buffered event if the queue is full.
    pub fn enqueue(&self, input: AuditEventInput) {
        let mut event = materialize(input);
        event.payload = enforce_payload_cap(
            redact_payload(&event.payload, self.config.redaction_mode, self.config.debug_char_limit),
            self.config.max_payload_bytes,
        );
        self.queue.push(event);
    }

    /// Number of events currently buffered, awaiting drain.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Total events dropped for capacity over this pipeline's lifetime.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Start the drain task. Idempotent — a second call is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = self.queue.clone();
        let sink = self.sink.clone();
        let handle = tokio::spawn(async move {
            loop {
                let event = queue.pop().await;
                if let Err(err) = sink.write(&event).await {
                    tracing::warn!(error = %err, "audit sink write failed during drain");
                }
            }
        });
        *self.drain_task.lock().await = Some(handle);
    }

    /// Stop the drain task after flushing whatever remains queued.
    pub async fn close(&self) {
        while let Some(event) = self.queue.try_pop() {
            if let Err(err) = self.sink.write(&event).await {
                tracing::warn!(error = %err, "audit sink write failed during close-flush");
            }
        }
        if let Some(handle) = self.drain_task.lock().await.take() {
            handle.abort();
        }
    }
}
