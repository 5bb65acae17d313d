//! The audit event schema and the per-request
//! rollup it feeds.

use crate::id::{AgentId, RequestId, SpanId, TraceId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Schema version stamped on every audit event and every wire message.
pub const SCHEMA_VERSION: &str = "1.0";
/// Event-format version, bumped when the shape of [`AuditEvent`] changes
/// in a way that matters to readers of the JSONL log.
pub const EVENT_VERSION: u32 = 1;

/// How risky a tool call or capability use is judged to be.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Read-only, side-effect-free actions.
    Low,
    /// Actions with bounded, reversible side effects.
    Medium,
    /// Actions with unbounded or hard-to-reverse side effects.
    High,
    /// Actions that can cause irreversible damage.
    Critical,
}

/// The outcome of an authorization decision.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// The action was permitted.
    Allow,
    /// The action was refused.
    Deny,
}

/// An authorization decision plus its rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// What was decided.
    pub outcome: DecisionOutcome,
    /// Why, if the decision was not a trivial allow.
    pub reason: Option<String>,
}

impl Decision {
    /// Construct an allow decision.
    pub fn allow() -> Self {
        Self {
            outcome: DecisionOutcome::Allow,
            reason: None,
        }
    }

    /// Construct a deny decision with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            outcome: DecisionOutcome::Deny,
            reason: Some(reason.into()),
        }
    }
}

/// Model-call metadata attached to routing and inference events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMeta {
    /// The provider name (`openai`, `anthropic`, ...).
    pub provider: Option<String>,
    /// The model identifier within the provider.
    pub model_ref: Option<String>,
    /// HTTP-ish status code, when the failure came from a transport.
    pub status_code: Option<u16>,
    /// Provider-specific error code, when available.
    pub error_code: Option<String>,
    /// Source candidate of a fallback edge.
    pub from_model_ref: Option<String>,
    /// Destination candidate of a fallback edge.
    pub to_model_ref: Option<String>,
}

/// Tool-call metadata attached to tool-guard and tool-execution events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMeta {
    /// The tool's name.
    pub tool_name: Option<String>,
    /// The model-issued call id for this invocation, if any.
    pub tool_call_id: Option<String>,
    /// Whether the call was blocked before execution.
    pub blocked: bool,
}

/// Per-event metrics. Any field the event type doesn't produce is left
/// at its default (`None`/`0`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Wall-clock latency in milliseconds, where applicable.
    pub latency_ms: Option<u64>,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
    /// Cost in USD, rounded to 8 decimal places.
    pub cost_usd: Option<Decimal>,
    /// Number of retries performed.
    pub retries: u32,
    /// Number of fallback hops performed.
    pub fallback_hops: u32,
    /// Tool calls attempted.
    pub tool_calls: u32,
    /// Tool calls blocked by the guard.
    pub blocked_tool_calls: u32,
    /// Synchronous delegation calls (`agents.call`).
    pub delegation_calls: u32,
    /// Asynchronous delegation messages (`agents.message`).
    pub delegation_messages: u32,
    /// Artifacts published.
    pub artifacts_published: u32,
    /// Artifacts fetched.
    pub artifacts_fetched: u32,
}

/// An immutable audit record.
///
/// Invariant: `trace_id` and `agent_id` are non-empty, and `payload` is
/// always present (possibly `Value::Object` with no keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Schema version, always [`SCHEMA_VERSION`] for events this crate
    /// produces.
    pub schema_version: String,
    /// Event-format version, always [`EVENT_VERSION`] for events this
    /// crate produces.
    pub event_version: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The trace this event belongs to. Never empty.
    pub trace_id: TraceId,
    /// The span within the trace, if the emitting call has one.
    pub span_id: Option<SpanId>,
    /// The agent responsible for this event. Never empty; defaults to
    /// `"unknown"` when the caller does not supply one.
    pub agent_id: AgentId,
    /// Free-form domain event type, e.g. `"model.call.start"`.
    pub event_type: String,
    /// Risk classification, where applicable.
    pub risk_tier: Option<RiskTier>,
    /// Authorization decision, where applicable.
    pub decision: Option<Decision>,
    /// Model metadata, where applicable.
    pub model: Option<ModelMeta>,
    /// Tool metadata, where applicable.
    pub tool: Option<ToolMeta>,
    /// Metrics, where applicable.
    pub metrics: Option<Metrics>,
    /// Redacted domain payload. Always present, even if empty.
    pub payload: serde_json::Value,
}

/// Unvalidated input used to construct an [`AuditEvent`]. The audit
/// sink pipeline materializes this into a full event, filling in
/// `schema_version`, `event_version`, `timestamp`, and defaulting
/// `agent_id` to `"unknown"`.
#[derive(Debug, Clone, Default)]
pub struct AuditEventInput {
    /// Explicit timestamp, if the caller already has one.
    pub timestamp: Option<i64>,
    /// Trace id. Required — materialization fails without one.
    pub trace_id: Option<TraceId>,
    /// Span id, if any.
    pub span_id: Option<SpanId>,
    /// Agent id. Defaults to `"unknown"` if absent.
    pub agent_id: Option<AgentId>,
    /// Event type. Required.
    pub event_type: Option<String>,
    /// Risk tier, if any.
    pub risk_tier: Option<RiskTier>,
    /// Decision, if any.
    pub decision: Option<Decision>,
    /// Model metadata, if any.
    pub model: Option<ModelMeta>,
    /// Tool metadata, if any.
    pub tool: Option<ToolMeta>,
    /// Metrics, if any.
    pub metrics: Option<Metrics>,
    /// Domain payload. Defaults to an empty object.
    pub payload: Option<serde_json::Value>,
}

impl AuditEventInput {
    /// Start building an input for the given trace/agent/event-type.
    pub fn new(
        trace_id: impl Into<TraceId>,
        agent_id: impl Into<AgentId>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            agent_id: Some(agent_id.into()),
            event_type: Some(event_type.into()),
            ..Default::default()
        }
    }
}

/// Per-request rollup.
///
/// Created on the first event observed for a request id; destroyed
/// when `request.end` arrives. Counters mirror the fields summed into
/// the terminal `request.end` event's [`Metrics`].
#[derive(Debug, Clone)]
pub struct RequestState {
    /// The request this rollup tracks.
    pub request_id: RequestId,
    /// Trace the request belongs to.
    pub trace_id: TraceId,
    /// Span, if the request carries one.
    pub span_id: Option<SpanId>,
    /// Agent that owns the request.
    pub agent_id: AgentId,
    /// When the rollup was created, milliseconds since epoch.
    pub start_ts: i64,
    /// Accumulated metrics.
    pub metrics: Metrics,
}

impl RequestState {
    /// Start a new rollup at the given timestamp.
    pub fn new(
        request_id: RequestId,
        trace_id: TraceId,
        span_id: Option<SpanId>,
        agent_id: AgentId,
        start_ts: i64,
    ) -> Self {
        Self {
            request_id,
            trace_id,
            span_id,
            agent_id,
            start_ts,
            metrics: Metrics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers_set_expected_outcome() {
        assert_eq!(Decision::allow().outcome, DecisionOutcome::Allow);
        let d = Decision::deny("blocked by policy");
        assert_eq!(d.outcome, DecisionOutcome::Deny);
        assert_eq!(d.reason.as_deref(), Some("blocked by policy"));
    }

    #[test]
    fn risk_tier_orders_low_to_critical() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn audit_event_input_builder_sets_required_fields() {
        let input = AuditEventInput::new("trace-1", "agent-a", "model.call.start");
        assert_eq!(input.trace_id.unwrap().as_str(), "trace-1");
        assert_eq!(input.agent_id.unwrap().as_str(), "agent-a");
        assert_eq!(input.event_type.unwrap(), "model.call.start");
    }
}
