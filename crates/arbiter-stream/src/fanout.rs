//! The stream fanout registry: subscription lifecycle, replay-on-subscribe,
//! live delivery, and periodic rollup rebroadcast.

use crate::filter::StreamFilter;
use crate::replay::{ReplayBuffer, ReplayConfig};
use crate::subscription::Subscription;
use crate::wire::ServerMessage;
use arbiter_observability::Rollups;
use arbiter_types::AuditEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Server-side defaults for newly registered subscriptions.
#[derive(Debug, Clone, Copy)]
pub struct FanoutConfig {
    /// Default per-second cap applied when a subscriber doesn't specify one.
    pub server_max_events_per_sec: u32,
    /// Backlog capacity for every subscription.
    pub server_max_buffered_events: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            server_max_events_per_sec: 20,
            server_max_buffered_events: 1_000,
        }
    }
}

/// Owns the replay buffer and every live subscription.
pub struct StreamFanout {
    config: FanoutConfig,
    replay: Mutex<ReplayBuffer>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl StreamFanout {
    /// Build a fanout with the given configuration.
    pub fn new(config: FanoutConfig, replay_config: ReplayConfig) -> Self {
        Self {
            config,
            replay: Mutex::new(ReplayBuffer::new(replay_config)),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Ingest a redacted event from the audit pipeline: append it to
    /// the replay buffer and deliver it to every matching subscription.
    pub fn ingest(&self, event: AuditEvent, now: i64) {
        {
            let mut replay = self.replay.lock().expect("replay buffer mutex poisoned");
            replay.push(event.clone(), now);
        }
        let mut subs = self.subscriptions.lock().expect("subscriptions mutex poisoned");
        for sub in subs.values_mut() {
            if sub.filter().matches(&event) {
                sub.offer(ServerMessage::event(event.clone()), now);
            }
        }
    }

    /// Register a new subscription, returning its outbound receiver and
    /// the initial snapshot of matching replay-buffer events.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        filter: StreamFilter,
        max_events_per_sec: Option<u32>,
        now: i64,
    ) -> UnboundedReceiver<ServerMessage> {
        let id = id.into();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();
        let snapshot: Vec<AuditEvent> = {
            let replay = self.replay.lock().expect("replay buffer mutex poisoned");
            replay.events().filter(|e| filter.matches(e)).cloned().collect()
        };
        let _ = tx.send(ServerMessage::snapshot(snapshot));
        let sub = Subscription::new(
            id.clone(),
            filter,
            max_events_per_sec.unwrap_or(self.config.server_max_events_per_sec),
            self.config.server_max_buffered_events,
            now,
            tx,
        );
        self.subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .insert(id, sub);
        rx
    }

    /// Remove a subscription on disconnect.
    pub fn unsubscribe(&self, id: &str) {
        self.subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .remove(id);
    }

    /// Number of currently registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().expect("subscriptions mutex poisoned").len()
    }

    /// Broadcast spend and health rollups to every subscription if
    /// their respective dirty flags are set, as the periodic 5s task
    /// does. Returns `(spend_sent, health_sent)`.
    pub fn maybe_rebroadcast_rollups(&self, rollups: &Rollups, now: i64) -> (bool, bool) {
        let spend_dirty = rollups.take_spend_dirty();
        let health_dirty = rollups.take_health_dirty();
        if !spend_dirty && !health_dirty {
            return (false, false);
        }
        let mut subs = self.subscriptions.lock().expect("subscriptions mutex poisoned");
        if spend_dirty {
            let payload = spend_payload(rollups);
            for sub in subs.values_mut() {
                sub.offer(ServerMessage::spend(payload.clone()), now);
            }
        }
        if health_dirty {
            let payload = health_payload(rollups);
            for sub in subs.values_mut() {
                sub.offer(ServerMessage::health(payload.clone()), now);
            }
        }
        (spend_dirty, health_dirty)
    }
}

fn spend_payload(rollups: &Rollups) -> serde_json::Value {
    let by_model = rollups.by_model_snapshot();
    let by_agent = rollups.by_agent_snapshot();
    serde_json::json!({
        "byModel": by_model.iter().map(|((provider, model_ref), r)| {
            serde_json::json!({
                "provider": provider, "modelRef": model_ref,
                "calls": r.calls, "tokensIn": r.tokens_in, "tokensOut": r.tokens_out,
                "costUsd": r.cost_usd,
            })
        }).collect::<Vec<_>>(),
        "byAgent": by_agent.iter().map(|(agent_id, r)| {
            serde_json::json!({
                "agentId": agent_id, "calls": r.calls,
                "tokensIn": r.tokens_in, "tokensOut": r.tokens_out, "costUsd": r.cost_usd,
            })
        }).collect::<Vec<_>>(),
    })
}

fn health_payload(rollups: &Rollups) -> serde_json::Value {
    let by_model = rollups.by_model_snapshot();
    let edges = rollups.fallback_edges_snapshot();
    serde_json::json!({
        "byModel": by_model.iter().map(|((provider, model_ref), r)| {
            serde_json::json!({
                "provider": provider, "modelRef": model_ref,
                "circuitState": r.circuit_state, "consecutiveFailures": r.consecutive_failures,
                "lastError": r.last_error,
            })
        }).collect::<Vec<_>>(),
        "fallbackEdges": edges.iter().map(|((from, to), count)| {
            serde_json::json!({ "from": from, "to": to, "count": count })
        }).collect::<Vec<_>>(),
    })
}
