//! Per-trace guard state: recursion depth, call count, task-hash
//! dedup, and pair-level rate limiting.

use crate::limits::DelegationLimits;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Width of the pair-rate-limit rolling window.
pub const PAIR_WINDOW_MS: i64 = 60_000;
/// A trace guard idle this long is dropped.
pub const TRACE_GUARD_IDLE_MS: i64 = 15 * 60 * 1000;

/// Compute the dedup task hash over `{to, normalized_message,
/// sorted_artifact_ids, session_key}`. `sorted_artifact_ids` must
/// already be sorted by the caller.
pub fn task_hash(to: &str, normalized_message: &str, sorted_artifact_ids: &[String], session_key: &str) -> String {
    let payload = serde_json::json!({
        "to": to,
        "normalizedMessage": normalized_message,
        "sortedArtifactIds": sorted_artifact_ids,
        "sessionKey": session_key,
    });
    let bytes = serde_json::to_vec(&payload).expect("json values always serialize");
    let digest = Sha256::digest(&bytes);
    format!("{digest:x}")
}

/// Why a `agents.call` was refused before it ever reached the agent
/// runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardCheck {
    /// The call may proceed; the guard has already recorded it.
    Proceed,
    /// A prior identical call is still within the dedup window.
    Deduped,
    /// A depth, call-count, or pair-rate limit was exceeded.
    Blocked(String),
}

struct TraceGuard {
    active_depth: u32,
    call_count: u32,
    task_hashes: HashMap<String, i64>,
    pair_windows: HashMap<(String, String), VecDeque<i64>>,
    last_touch: i64,
}

impl TraceGuard {
    fn new(now: i64) -> Self {
        Self {
            active_depth: 0,
            call_count: 0,
            task_hashes: HashMap::new(),
            pair_windows: HashMap::new(),
            last_touch: now,
        }
    }

    fn prune(&mut self, now: i64, dedupe_window_ms: i64) {
        self.task_hashes.retain(|_, &mut seen| now - seen <= dedupe_window_ms);
        for bucket in self.pair_windows.values_mut() {
            while let Some(&front) = bucket.front() {
                if now - front > PAIR_WINDOW_MS {
                    bucket.pop_front();
                } else {
                    break;
                }
            }
        }
    }
}

/// Tracks one [`TraceGuard`] per trace id.
#[derive(Default)]
pub struct TraceGuardRegistry {
    guards: Mutex<HashMap<String, TraceGuard>>,
}

impl TraceGuardRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the full ordered check (depth, call count, dedup, pair
    /// rate limit) and, if it passes, atomically commit the call: increment
    /// `activeDepth`/`callCount`, record the task hash and pair
    /// timestamp. A deduped or blocked call leaves no trace of itself
    /// beyond what the dedup/pair windows already held.
    pub fn check_and_enter(
        &self,
        trace_id: &str,
        from: &str,
        to: &str,
        hash: &str,
        limits: &DelegationLimits,
        now: i64,
    ) -> GuardCheck {
        let mut guards = self.guards.lock().expect("trace guard mutex poisoned");
        let guard = guards.entry(trace_id.to_string()).or_insert_with(|| TraceGuard::new(now));
        guard.prune(now, limits.dedupe_window_ms as i64);
        guard.last_touch = now;

        if guard.active_depth >= limits.max_depth {
            return GuardCheck::Blocked("maxDepth exceeded".to_string());
        }
        if guard.call_count >= limits.max_calls_per_trace {
            return GuardCheck::Blocked("maxCallsPerTrace exceeded".to_string());
        }
        if guard.task_hashes.contains_key(hash) {
            return GuardCheck::Deduped;
        }
        let pair_key = (from.to_string(), to.to_string());
        let pair_len = guard.pair_windows.get(&pair_key).map(VecDeque::len).unwrap_or(0);
        if pair_len >= limits.pair_rate_limit_per_minute as usize {
            return GuardCheck::Blocked("pairRateLimitPerMinute exceeded".to_string());
        }

        guard.active_depth += 1;
        guard.call_count += 1;
        guard.task_hashes.insert(hash.to_string(), now);
        guard.pair_windows.entry(pair_key).or_default().push_back(now);
        GuardCheck::Proceed
    }

    /// Release the trace's depth slot after a call completes, whatever
    /// its outcome.
    pub fn release(&self, trace_id: &str, now: i64) {
        let mut guards = self.guards.lock().expect("trace guard mutex poisoned");
        if let Some(guard) = guards.get_mut(trace_id) {
            guard.active_depth = guard.active_depth.saturating_sub(1);
            guard.last_touch = now;
        }
    }

    /// Drop trace guards idle for longer than [`TRACE_GUARD_IDLE_MS`].
    pub fn prune_idle(&self, now: i64) {
        let mut guards = self.guards.lock().expect("trace guard mutex poisoned");
        guards.retain(|_, guard| now - guard.last_touch <= TRACE_GUARD_IDLE_MS);
    }

    /// Number of live trace guards, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.guards.lock().expect("trace guard mutex poisoned").len()
    }

    /// Whether the registry currently holds no trace guards.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DelegationLimits {
        DelegationLimits { max_depth: 1, max_calls_per_trace: 2, pair_rate_limit_per_minute: 1, ..DelegationLimits::default() }
    }

    #[test]
    fn task_hash_excludes_limit_overrides_by_construction() {
        let a = task_hash("agent-b", "hello", &[], "sess-1");
        let b = task_hash("agent-b", "hello", &[], "sess-1");
        assert_eq!(a, b);
    }

    #[test]
    fn first_call_proceeds_and_is_recorded() {
        let registry = TraceGuardRegistry::new();
        let hash = task_hash("agent-b", "hi", &[], "sess-1");
        let outcome = registry.check_and_enter("trace-1", "agent-a", "agent-b", &hash, &limits(), 0);
        assert_eq!(outcome, GuardCheck::Proceed);
    }

    #[test]
    fn duplicate_task_hash_is_deduped_within_window() {
        let registry = TraceGuardRegistry::new();
        let lim = DelegationLimits { dedupe_window_ms: 60_000, ..limits() };
        let hash = task_hash("agent-b", "hi", &[], "sess-1");
        assert_eq!(registry.check_and_enter("trace-1", "agent-a", "agent-b", &hash, &lim, 0), GuardCheck::Proceed);
        registry.release("trace-1", 0);
        assert_eq!(registry.check_and_enter("trace-1", "agent-a", "agent-b", &hash, &lim, 10_000), GuardCheck::Deduped);
    }

    #[test]
    fn depth_limit_blocks_concurrent_calls_on_same_trace() {
        let registry = TraceGuardRegistry::new();
        let lim = limits();
        let h1 = task_hash("agent-b", "first", &[], "sess-1");
        let h2 = task_hash("agent-c", "second", &[], "sess-1");
        assert_eq!(registry.check_and_enter("trace-1", "agent-a", "agent-b", &h1, &lim, 0), GuardCheck::Proceed);
        match registry.check_and_enter("trace-1", "agent-a", "agent-c", &h2, &lim, 1) {
            GuardCheck::Blocked(reason) => assert!(reason.contains("maxDepth")),
            other => panic!("expected Blocked(maxDepth), got {other:?}"),
        }
    }

    #[test]
    fn call_count_limit_blocks_after_the_trace_quota_is_spent() {
        let registry = TraceGuardRegistry::new();
        let lim = limits();
        let h1 = task_hash("agent-b", "one", &[], "s");
        let h2 = task_hash("agent-b", "two", &[], "s");
        let h3 = task_hash("agent-b", "three", &[], "s");
        assert_eq!(registry.check_and_enter("trace-1", "a", "agent-b", &h1, &lim, 0), GuardCheck::Proceed);
        registry.release("trace-1", 0);
        assert_eq!(registry.check_and_enter("trace-1", "a", "agent-b", &h2, &lim, 1), GuardCheck::Proceed);
        registry.release("trace-1", 1);
        match registry.check_and_enter("trace-1", "a", "agent-b", &h3, &lim, 2) {
            GuardCheck::Blocked(reason) => assert!(reason.contains("maxCallsPerTrace")),
            other => panic!("expected Blocked(maxCallsPerTrace), got {other:?}"),
        }
    }

    #[test]
    fn pair_rate_limit_blocks_after_the_per_minute_quota_is_spent() {
        let registry = TraceGuardRegistry::new();
        let lim = DelegationLimits { max_calls_per_trace: 10, ..limits() };
        let h1 = task_hash("agent-b", "one", &[], "s");
        let h2 = task_hash("agent-b", "two", &[], "s");
        assert_eq!(registry.check_and_enter("trace-1", "a", "agent-b", &h1, &lim, 0), GuardCheck::Proceed);
        registry.release("trace-1", 0);
        match registry.check_and_enter("trace-1", "a", "agent-b", &h2, &lim, 1) {
            GuardCheck::Blocked(reason) => assert!(reason.contains("pairRateLimitPerMinute")),
            other => panic!("expected Blocked(pairRateLimitPerMinute), got {other:?}"),
        }
    }

    #[test]
    fn pair_window_frees_capacity_after_sixty_seconds() {
        let registry = TraceGuardRegistry::new();
        let lim = DelegationLimits { max_calls_per_trace: 10, ..limits() };
        let h1 = task_hash("agent-b", "one", &[], "s");
        let h2 = task_hash("agent-b", "two", &[], "s");
        assert_eq!(registry.check_and_enter("trace-1", "a", "agent-b", &h1, &lim, 0), GuardCheck::Proceed);
        registry.release("trace-1", 0);
        let outcome = registry.check_and_enter("trace-1", "a", "agent-b", &h2, &lim, PAIR_WINDOW_MS + 1);
        assert_eq!(outcome, GuardCheck::Proceed);
    }

    #[test]
    fn idle_traces_are_pruned() {
        let registry = TraceGuardRegistry::new();
        let hash = task_hash("agent-b", "hi", &[], "s");
        registry.check_and_enter("trace-1", "a", "agent-b", &hash, &limits(), 0);
        registry.release("trace-1", 0);
        assert_eq!(registry.len(), 1);
        registry.prune_idle(TRACE_GUARD_IDLE_MS + 1);
        assert!(registry.is_empty());
    }
}
