//! Spend and health rollups.

use crate::circuit::CircuitState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-model spend and health totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRollup {
    /// Model calls attempted.
    pub calls: u64,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
    /// Cost in USD, rounded to 8 decimal places.
    pub cost_usd: Decimal,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Current circuit state.
    pub circuit_state: CircuitState,
    /// Most recent failure reason, if any.
    pub last_error: Option<String>,
}

/// Per-agent spend totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRollup {
    /// Model calls attributed to this agent.
    pub calls: u64,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
    /// Cost in USD, rounded to 8 decimal places.
    pub cost_usd: Decimal,
}

/// A single completed model call, as reported to [`Rollups::record_call`].
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Provider name.
    pub provider: String,
    /// Model identifier within the provider.
    pub model_ref: String,
    /// Agent that issued the call.
    pub agent_id: String,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
    /// Cost in USD.
    pub cost_usd: Decimal,
    /// Whether the call succeeded.
    pub success: bool,
    /// Failure reason, when `success` is false.
    pub error: Option<String>,
}

/// Process-wide spend/health aggregation, keyed by model and by agent,
/// plus a fallback-edge counter.
#[derive(Default)]
pub struct Rollups {
    by_model: Mutex<HashMap<(String, String), ModelRollup>>,
    by_agent: Mutex<HashMap<String, AgentRollup>>,
    fallback_edges: Mutex<HashMap<(String, String), u64>>,
    spend_dirty: std::sync::atomic::AtomicBool,
    health_dirty: std::sync::atomic::AtomicBool,
}

impl Rollups {
    /// Construct empty rollups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call's outcome into both the per-model and
    /// per-agent rollups.
    pub fn record_call(&self, outcome: &CallOutcome) {
        {
            let mut guard = self.by_model.lock().expect("rollup mutex poisoned");
            let entry = guard
                .entry((outcome.provider.clone(), outcome.model_ref.clone()))
                .or_default();
            entry.calls += 1;
            entry.tokens_in += outcome.tokens_in;
            entry.tokens_out += outcome.tokens_out;
            entry.cost_usd += outcome.cost_usd;
            if outcome.success {
                entry.consecutive_failures = 0;
                entry.last_error = None;
            } else {
                entry.consecutive_failures += 1;
                entry.last_error = outcome.error.clone();
            }
        }
        {
            let mut guard = self.by_agent.lock().expect("rollup mutex poisoned");
            let entry = guard.entry(outcome.agent_id.clone()).or_default();
            entry.calls += 1;
            entry.tokens_in += outcome.tokens_in;
            entry.tokens_out += outcome.tokens_out;
            entry.cost_usd += outcome.cost_usd;
        }
        self.spend_dirty.store(true, std::sync::atomic::Ordering::Relaxed);
        self.health_dirty.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Record a fallback edge traversal.
    pub fn record_fallback_edge(&self, from_model_ref: &str, to_model_ref: &str) {
        let mut guard = self.fallback_edges.lock().expect("rollup mutex poisoned");
        *guard
            .entry((from_model_ref.to_string(), to_model_ref.to_string()))
            .or_insert(0) += 1;
        self.health_dirty.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Update the circuit-state field of a model rollup. Called by the
    /// circuit breaker's owner after a state transition.
    pub fn set_circuit_state(&self, provider: &str, model_ref: &str, state: CircuitState) {
        let mut guard = self.by_model.lock().expect("rollup mutex poisoned");
        guard
            .entry((provider.to_string(), model_ref.to_string()))
            .or_default()
            .circuit_state = state;
        self.health_dirty.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Snapshot all per-model rollups.
    pub fn by_model_snapshot(&self) -> HashMap<(String, String), ModelRollup> {
        self.by_model.lock().expect("rollup mutex poisoned").clone()
    }

    /// Snapshot all per-agent rollups.
    pub fn by_agent_snapshot(&self) -> HashMap<String, AgentRollup> {
        self.by_agent.lock().expect("rollup mutex poisoned").clone()
    }

    /// Snapshot fallback edge counts.
    pub fn fallback_edges_snapshot(&self) -> HashMap<(String, String), u64> {
        self.fallback_edges.lock().expect("rollup mutex poisoned").clone()
    }

    /// Whether spend has changed since the last `take_spend_dirty`.
    pub fn take_spend_dirty(&self) -> bool {
        self.spend_dirty.swap(false, std::sync::atomic::Ordering::Relaxed)
    }

    /// Whether health has changed since the last `take_health_dirty`.
    pub fn take_health_dirty(&self) -> bool {
        self.health_dirty.swap(false, std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool) -> CallOutcome {
        CallOutcome {
            provider: "openai".to_string(),
            model_ref: "gpt-4".to_string(),
            agent_id: "agent-a".to_string(),
            tokens_in: 10,
            tokens_out: 5,
            cost_usd: Decimal::new(12, 2),
            success,
            error: if success { None } else { Some("timeout".to_string()) },
        }
    }

    #[test]
    fn record_call_accumulates_both_rollups() {
        let rollups = Rollups::new();
        rollups.record_call(&outcome(true));
        rollups.record_call(&outcome(false));
        let model = rollups.by_model_snapshot();
        let entry = &model[&("openai".to_string(), "gpt-4".to_string())];
        assert_eq!(entry.calls, 2);
        assert_eq!(entry.tokens_in, 20);
        assert_eq!(entry.consecutive_failures, 1);

        let agent = rollups.by_agent_snapshot();
        assert_eq!(agent["agent-a"].calls, 2);
    }

    #[test]
    fn dirty_flags_reset_after_take() {
        let rollups = Rollups::new();
        rollups.record_call(&outcome(true));
        assert!(rollups.take_spend_dirty());
        assert!(!rollups.take_spend_dirty());
    }

    #[test]
    fn fallback_edges_are_counted() {
        let rollups = Rollups::new();
        rollups.record_fallback_edge("gpt-4", "gpt-3.5");
        rollups.record_fallback_edge("gpt-4", "gpt-3.5");
        let edges = rollups.fallback_edges_snapshot();
        assert_eq!(edges[&("gpt-4".to_string(), "gpt-3.5".to_string())], 2);
    }
}
