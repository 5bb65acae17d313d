//! Stream wire protocol.

use crate::filter::StreamFilter;
use arbiter_types::{AuditEvent, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};

/// `OBS.SUBSCRIBE` request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Always [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// Filter to apply to both the initial snapshot and live delivery.
    #[serde(default)]
    pub filters: Option<StreamFilter>,
    /// Per-second delivery cap for this subscription.
    pub max_events_per_sec: Option<u32>,
}

/// Error payload shape carried by `OBS.ERROR`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamError {
    /// Always [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// Machine-readable error code, e.g. `"BUFFER_OVERFLOW"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the subscriber may retry (reconnect/resubscribe).
    pub retryable: Option<bool>,
    /// Additional structured context.
    pub details: Option<serde_json::Value>,
}

impl StreamError {
    /// Build a `BUFFER_OVERFLOW` error for a dropped-event notification.
    pub fn buffer_overflow(dropped: u64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            code: "BUFFER_OVERFLOW".to_string(),
            message: "subscriber backlog exceeded capacity; oldest queued event dropped"
                .to_string(),
            retryable: Some(true),
            details: Some(serde_json::json!({ "droppedTotal": dropped })),
        }
    }
}

/// Every message the fanout sends to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// `OBS.SNAPSHOT` — the filtered replay buffer, sent once on subscribe.
    #[serde(rename = "OBS.SNAPSHOT")]
    Snapshot {
        /// Always [`SCHEMA_VERSION`].
        schema_version: String,
        /// Matching events from the replay buffer, oldest first.
        events: Vec<AuditEvent>,
    },
    /// `OBS.EVENT` — a single live event matching the subscription filter.
    #[serde(rename = "OBS.EVENT")]
    Event {
        /// Always [`SCHEMA_VERSION`].
        schema_version: String,
        /// The event.
        event: AuditEvent,
    },
    /// `OBS.HEALTH` — a periodic health rollup broadcast.
    #[serde(rename = "OBS.HEALTH")]
    Health {
        /// Always [`SCHEMA_VERSION`].
        schema_version: String,
        /// The rollup payload.
        payload: serde_json::Value,
    },
    /// `OBS.SPEND` — a periodic spend rollup broadcast.
    #[serde(rename = "OBS.SPEND")]
    Spend {
        /// Always [`SCHEMA_VERSION`].
        schema_version: String,
        /// The rollup payload.
        payload: serde_json::Value,
    },
    /// `OBS.PONG` — reply to `OBS.PING`.
    #[serde(rename = "OBS.PONG")]
    Pong {
        /// Always [`SCHEMA_VERSION`].
        schema_version: String,
    },
    /// `OBS.ERROR` — a protocol or delivery error.
    #[serde(rename = "OBS.ERROR")]
    Error {
        /// Always [`SCHEMA_VERSION`].
        schema_version: String,
        /// The error payload.
        error: StreamError,
    },
}

impl ServerMessage {
    /// Construct a snapshot message.
    pub fn snapshot(events: Vec<AuditEvent>) -> Self {
        Self::Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            events,
        }
    }

    /// Construct a live event message.
    pub fn event(event: AuditEvent) -> Self {
        Self::Event {
            schema_version: SCHEMA_VERSION.to_string(),
            event,
        }
    }

    /// Construct a health rollup message.
    pub fn health(payload: serde_json::Value) -> Self {
        Self::Health {
            schema_version: SCHEMA_VERSION.to_string(),
            payload,
        }
    }

    /// Construct a spend rollup message.
    pub fn spend(payload: serde_json::Value) -> Self {
        Self::Spend {
            schema_version: SCHEMA_VERSION.to_string(),
            payload,
        }
    }

    /// Construct a buffer-overflow error message.
    pub fn buffer_overflow(dropped: u64) -> Self {
        Self::Error {
            schema_version: SCHEMA_VERSION.to_string(),
            error: StreamError::buffer_overflow(dropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_tags_use_obs_namespace() {
        let msg = ServerMessage::buffer_overflow(3);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "OBS.ERROR");
        assert_eq!(json["error"]["code"], "BUFFER_OVERFLOW");
    }

    #[test]
    fn subscribe_request_round_trips() {
        let raw = serde_json::json!({
            "schemaVersion": "1.0",
            "filters": {"agentId": "agent-a"},
            "maxEventsPerSec": 5,
        });
        let req: SubscribeRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.max_events_per_sec, Some(5));
        assert!(req.filters.unwrap().agent_id.is_some());
    }
}
