//! Replay buffer: the window of recent events served as an initial
//! snapshot to new subscribers.

use arbiter_types::AuditEvent;
use std::collections::VecDeque;

/// Configuration for the replay buffer.
#[derive(Debug, Clone, Copy)]
pub struct ReplayConfig {
    /// Maximum number of events retained regardless of age.
    pub max_buffered_events: usize,
    /// Window, in milliseconds, within which events are retained even
    /// past `max_buffered_events` — eviction requires both the event to
    /// be stale AND the buffer to be over capacity.
    pub replay_window_ms: i64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_buffered_events: 10_000,
            replay_window_ms: 300_000,
        }
    }
}

/// A bounded, time-aware buffer of recently seen events.
pub struct ReplayBuffer {
    config: ReplayConfig,
    events: VecDeque<AuditEvent>,
}

impl ReplayBuffer {
    /// Construct an empty buffer.
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            events: VecDeque::new(),
        }
    }

    /// Append an event, then evict from the head any event that is
    /// both older than the replay window and pushes the buffer past
    /// capacity.
    pub fn push(&mut self, event: AuditEvent, now: i64) {
        self.events.push_back(event);
        while self.events.len() > self.config.max_buffered_events {
            match self.events.front() {
                Some(front) if now - front.timestamp > self.config.replay_window_ms => {
                    self.events.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Events currently retained, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter()
    }

    /// Number of events currently retained.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_types::{EVENT_VERSION, SCHEMA_VERSION};

    fn event_at(ts: i64) -> AuditEvent {
        AuditEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_version: EVENT_VERSION,
            timestamp: ts,
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

    #[test]
    fn retains_events_under_capacity_regardless_of_age() {
        let mut buf = ReplayBuffer::new(ReplayConfig {
            max_buffered_events: 10,
            replay_window_ms: 1000,
        });
        buf.push(event_at(0), 100_000);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn evicts_stale_events_once_over_capacity() {
        let mut buf = ReplayBuffer::new(ReplayConfig {
            max_buffered_events: 1,
            replay_window_ms: 1000,
        });
        buf.push(event_at(0), 0);
        buf.push(event_at(5000), 5000);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.events().next().unwrap().timestamp, 5000);
    }

    #[test]
    fn keeps_over_capacity_events_that_are_still_fresh() {
        let mut buf = ReplayBuffer::new(ReplayConfig {
            max_buffered_events: 1,
            replay_window_ms: 10_000,
        });
        buf.push(event_at(0), 0);
        buf.push(event_at(500), 500);
        assert_eq!(buf.len(), 2);
    }
}
