//! Delegation limits: clamped integers merged from global, agent, and
//! per-call overrides.

use serde::{Deserialize, Serialize};

/// Per-call delegation limits, already merged from whatever layers the
/// caller maintains (global defaults, agent overrides, call overrides).
/// [`DelegationLimits::resolve`] clamps every field into its allowed
/// range so a zeroed or partially-specified merge still behaves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelegationLimits {
    /// Wall-clock budget for one `agents.call`, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum simultaneous nesting depth within one trace.
    pub max_depth: u32,
    /// Maximum `agents.call` invocations within one trace.
    pub max_calls_per_trace: u32,
    /// Maximum tool calls a delegated agent may make.
    pub max_tool_calls: u32,
    /// Width of the task-hash dedup window, in milliseconds.
    pub dedupe_window_ms: u64,
    /// Maximum `agents.call` invocations per `(from, to)` pair per
    /// rolling minute.
    pub pair_rate_limit_per_minute: u32,
}

impl Default for DelegationLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_depth: 3,
            max_calls_per_trace: 8,
            max_tool_calls: 24,
            dedupe_window_ms: 60_000,
            pair_rate_limit_per_minute: 6,
        }
    }
}

impl DelegationLimits {
    /// Clamp every field into its allowed range.
    pub fn resolve(mut self) -> Self {
        self.timeout_ms = self.timeout_ms.clamp(100, 600_000);
        self.max_depth = self.max_depth.clamp(1, 10);
        self.max_calls_per_trace = self.max_calls_per_trace.clamp(1, 100);
        self.max_tool_calls = self.max_tool_calls.clamp(1, 200);
        self.dedupe_window_ms = self.dedupe_window_ms.clamp(1_000, 600_000);
        self.pair_rate_limit_per_minute = self.pair_rate_limit_per_minute.clamp(1, 100);
        self
    }

    /// The timeout expressed in whole seconds, rounded up, as passed
    /// to the agent-execution collaborator.
    pub fn timeout_secs_ceil(&self) -> u64 {
        self.timeout_ms.div_ceil(1000)
    }
}
