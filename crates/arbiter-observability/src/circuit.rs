//! Per-candidate circuit breaker.
//!
//! A provider/model pair is **closed** while failures-in-window stay
//! below the threshold. The Nth failure opens the circuit for
//! `open_ms`; after that window elapses the next access check moves it
//! to **half_open**. The first success in half_open closes it again
//! and clears failure history.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Failures within `window_ms` required to open the circuit.
    pub failure_threshold: usize,
    /// Width of the rolling failure window, in milliseconds.
    pub window_ms: i64,
    /// How long an open circuit stays open before probing, in
    /// milliseconds.
    pub open_ms: i64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_ms: 60_000,
            open_ms: 60_000,
        }
    }
}

/// The externally observable state of a circuit.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Attempts proceed normally.
    #[default]
    Closed,
    /// Attempts are skipped until the open window elapses.
    Open,
    /// One probing attempt is allowed; its outcome decides the next state.
    HalfOpen,
}

struct CandidateCircuit {
    failures: VecDeque<i64>,
    open_until: Option<i64>,
    probing: bool,
    last_error: Option<String>,
}

impl CandidateCircuit {
    fn new() -> Self {
        Self {
            failures: VecDeque::new(),
            open_until: None,
            probing: false,
            last_error: None,
        }
    }

    fn prune(&mut self, now: i64, window_ms: i64) {
        while let Some(&front) = self.failures.front() {
            if now - front > window_ms {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn state(&self, now: i64) -> CircuitState {
        match self.open_until {
            Some(until) if now < until => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
            None => CircuitState::Closed,
        }
    }
}

/// A transition worth recording as a `health.circuit.state_change`
/// audit event.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Provider name.
    pub provider: String,
    /// Model identifier within the provider.
    pub model_ref: String,
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
}

/// Tracks circuit state for every `(provider, model_ref)` pair seen.
pub struct CircuitBreaker {
    config: CircuitConfig,
    circuits: Mutex<HashMap<(String, String), CandidateCircuit>>,
}

impl CircuitBreaker {
    /// Build a breaker with the given config.
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Whether an attempt against this candidate may proceed right now.
    /// Also performs the open → half_open transition as a side effect,
    /// since that transition only happens on access.
    pub fn can_attempt(&self, provider: &str, model_ref: &str, now: i64) -> (bool, Option<StateChange>) {
        let key = (provider.to_string(), model_ref.to_string());
        let mut guard = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let circuit = guard.entry(key).or_insert_with(CandidateCircuit::new);
        let before = circuit.state(now);
        if let Some(until) = circuit.open_until {
            if now >= until && !circuit.probing {
                circuit.probing = true;
                let after = circuit.state(now);
                return (
                    true,
                    Some(StateChange {
                        provider: provider.to_string(),
                        model_ref: model_ref.to_string(),
                        from: before,
                        to: after,
                    }),
                );
            }
            if now < until {
                return (false, None);
            }
        }
        (true, None)
    }

    /// Record a failure; may open the circuit.
    pub fn note_failure(
        &self,
        provider: &str,
        model_ref: &str,
        reason: &str,
        now: i64,
    ) -> Option<StateChange> {
        let key = (provider.to_string(), model_ref.to_string());
        let mut guard = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let circuit = guard.entry(key).or_insert_with(CandidateCircuit::new);
        let before = circuit.state(now);
        circuit.last_error = Some(reason.to_string());
        circuit.probing = false;
        circuit.failures.push_back(now);
        circuit.prune(now, self.config.window_ms);
        if circuit.failures.len() >= self.config.failure_threshold {
            circuit.open_until = Some(now + self.config.open_ms);
        }
        let after = circuit.state(now);
        (before != after).then(|| StateChange {
            provider: provider.to_string(),
            model_ref: model_ref.to_string(),
            from: before,
            to: after,
        })
    }

    /// Record a success; the first success in half_open closes the
    /// circuit and clears its failure history.
    pub fn note_success(&self, provider: &str, model_ref: &str, now: i64) -> Option<StateChange> {
        let key = (provider.to_string(), model_ref.to_string());
        let mut guard = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let circuit = guard.entry(key).or_insert_with(CandidateCircuit::new);
        let before = circuit.state(now);
        circuit.failures.clear();
        circuit.open_until = None;
        circuit.probing = false;
        circuit.last_error = None;
        let after = circuit.state(now);
        (before != after).then(|| StateChange {
            provider: provider.to_string(),
            model_ref: model_ref.to_string(),
            from: before,
            to: after,
        })
    }

    /// Current state, failure count in window, and last error for a
    /// candidate, for health rollup reporting.
    pub fn snapshot(&self, provider: &str, model_ref: &str, now: i64) -> (CircuitState, usize, Option<String>) {
        let key = (provider.to_string(), model_ref.to_string());
        let mut guard = self.circuits.lock().expect("circuit breaker mutex poisoned");
        match guard.get_mut(&key) {
            Some(circuit) => {
                circuit.prune(now, self.config.window_ms);
                (circuit.state(now), circuit.failures.len(), circuit.last_error.clone())
            }
            None => (CircuitState::Closed, 0, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitConfig::default());
        let mut last = None;
        for i in 0..3 {
            last = breaker.note_failure("openai", "gpt-4", "timeout", i * 1000);
        }
        assert_eq!(last.unwrap().to, CircuitState::Open);
        let (can, _) = breaker.can_attempt("openai", "gpt-4", 3000);
        assert!(!can);
    }

    #[test]
    fn circuit_half_opens_after_window_then_closes_on_success() {
        let breaker = CircuitBreaker::new(CircuitConfig::default());
        for i in 0..3 {
            breaker.note_failure("openai", "gpt-4", "timeout", i * 1000);
        }
        let (can, change) = breaker.can_attempt("openai", "gpt-4", 65_000);
        assert!(can);
        assert_eq!(change.unwrap().to, CircuitState::HalfOpen);
        let change = breaker.note_success("openai", "gpt-4", 65_100);
        assert_eq!(change.unwrap().to, CircuitState::Closed);
        let (can, _) = breaker.can_attempt("openai", "gpt-4", 65_200);
        assert!(can);
    }

    #[test]
    fn failures_outside_window_are_pruned() {
        let breaker = CircuitBreaker::new(CircuitConfig::default());
        breaker.note_failure("openai", "gpt-4", "timeout", 0);
        breaker.note_failure("openai", "gpt-4", "timeout", 61_000);
        let (_, count, _) = breaker.snapshot("openai", "gpt-4", 61_000);
        assert_eq!(count, 1);
    }
}
