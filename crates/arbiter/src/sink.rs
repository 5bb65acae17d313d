//! Bridges the audit pipeline's drain task into the stream fanout that
//! serves a live feed to operator subscribers.
//!
//! [`arbiter_audit::AuditPipeline`] only knows how to write to an
//! [`arbiter_audit::AuditSink`]; it has no notion of subscribers or
//! filters. This sink is the seam: every event the pipeline drains is
//! also pushed into a [`StreamFanout`], which owns its own replay
//! buffer and per-subscriber delivery.

use arbiter_audit::AuditError;
use arbiter_audit::AuditSink;
use arbiter_stream::StreamFanout;
use arbiter_types::AuditEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// An [`AuditSink`] that forwards every drained event into a
/// [`StreamFanout`] rather than (or alongside) persisting it.
pub struct FanoutSink {
    fanout: Arc<StreamFanout>,
}

impl FanoutSink {
    /// Wrap a fanout as a sink the audit pipeline can drain into.
    pub fn new(fanout: Arc<StreamFanout>) -> Self {
        Self { fanout }
    }
}

#[async_trait]
impl AuditSink for FanoutSink {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.fanout.ingest(event.clone(), now_millis());
        Ok(())
    }

    fn name(&self) -> &str {
        "stream_fanout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_stream::FanoutConfig;
    use arbiter_types::{EVENT_VERSION, SCHEMA_VERSION};

    fn event() -> AuditEvent {
        AuditEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_version: EVENT_VERSION,
            timestamp: 0,
            trace_id: "trace-1".into(),
            span_id: None,
            agent_id: "agent-a".into(),
            event_type: "test.event".to_string(),
            risk_tier: None,
            decision: None,
            model: None,
            tool: None,
            metrics: None,
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn write_ingests_into_the_fanout() {
        let fanout = Arc::new(StreamFanout::new(FanoutConfig::default(), Default::default()));
        let sink = FanoutSink::new(fanout.clone());
        sink.write(&event()).await.unwrap();
        let mut rx = fanout.subscribe("sub-1", Default::default(), None, 0);
        let snapshot = rx.recv().await.unwrap();
        assert!(matches!(snapshot, arbiter_stream::ServerMessage::Snapshot { events, .. } if events.len() == 1));
    }
}
