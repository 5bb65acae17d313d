//! Request-scoped counter aggregation.
//!
//! Resolves or creates a [`RequestState`] keyed by request id; when no
//! request id is supplied but a trace id is, falls back to a linear
//! scan by trace id — acceptable given the map stays small (bounded by
//! concurrently in-flight requests).
//!
//! On top of the bare resolve/update/finish primitives, this module
//! exposes one method per domain event a request can produce
//! (`model_call_start`, `tool_call_blocked`, `agent_message`, ...) plus
//! the `request_start`/`request_end` lifecycle. Each domain method
//! takes the already-built [`AuditEventInput`] its caller produced,
//! folds whatever [`Metrics`] it carries into the request's running
//! total, and hands the event back unchanged so the caller enqueues it
//! exactly as before. `request_end` removes the request and returns the
//! terminal event carrying the full accumulated metrics.

use arbiter_types::{AgentId, AuditEventInput, Metrics, RequestId, RequestState, SpanId, TraceId};
use std::collections::HashMap;
use std::sync::Mutex;

/// Tracks one [`RequestState`] per in-flight request.
#[derive(Default)]
pub struct RequestAggregator {
    states: Mutex<HashMap<RequestId, RequestState>>,
}

impl RequestAggregator {
    /// Construct an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a request's state by request id, falling back to a
    /// linear scan by trace id, creating a new rollup if neither is
    /// found.
    pub fn resolve_or_create(
        &self,
        request_id: Option<RequestId>,
        trace_id: TraceId,
        span_id: Option<SpanId>,
        agent_id: AgentId,
        now: i64,
    ) -> RequestId {
        let mut guard = self.states.lock().expect("request aggregator mutex poisoned");
        if let Some(id) = &request_id {
            if guard.contains_key(id) {
                return id.clone();
            }
        }
        if request_id.is_none() {
            if let Some((existing_id, _)) = guard.iter().find(|(_, s)| s.trace_id == trace_id) {
                return existing_id.clone();
            }
        }
        let id = request_id.unwrap_or_else(|| RequestId::from(trace_id.as_str()));
        guard.insert(
            id.clone(),
            RequestState::new(id.clone(), trace_id, span_id, agent_id, now),
        );
        id
    }

    /// Apply a mutation to an in-flight request's metrics. No-op if the
    /// request is unknown.
    pub fn update<F: FnOnce(&mut Metrics)>(&self, request_id: &RequestId, f: F) {
        let mut guard = self.states.lock().expect("request aggregator mutex poisoned");
        if let Some(state) = guard.get_mut(request_id) {
            f(&mut state.metrics);
        }
    }

    /// Remove and return a request's final state, on `request.end`.
    pub fn finish(&self, request_id: &RequestId) -> Option<RequestState> {
        self.states
            .lock()
            .expect("request aggregator mutex poisoned")
            .remove(request_id)
    }

    /// Number of requests currently tracked.
    pub fn len(&self) -> usize {
        self.states.lock().expect("request aggregator mutex poisoned").len()
    }

    /// Whether no requests are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add every field of `delta` onto the request's running totals.
    fn fold(&self, request_id: &RequestId, delta: &Metrics) {
        self.update(request_id, |m| {
            m.tokens_in += delta.tokens_in;
            m.tokens_out += delta.tokens_out;
            if let Some(cost) = delta.cost_usd {
                m.cost_usd = Some(m.cost_usd.unwrap_or_default() + cost);
            }
            m.retries += delta.retries;
            m.fallback_hops += delta.fallback_hops;
            m.tool_calls += delta.tool_calls;
            m.blocked_tool_calls += delta.blocked_tool_calls;
            m.delegation_calls += delta.delegation_calls;
            m.delegation_messages += delta.delegation_messages;
            m.artifacts_published += delta.artifacts_published;
            m.artifacts_fetched += delta.artifacts_fetched;
        });
    }

    /// Fold `event`'s metrics, if any, into the request's running
    /// totals, and hand the event back for the caller to enqueue.
    fn observe(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        if let Some(metrics) = &event.metrics {
            self.fold(request_id, metrics);
        }
        event
    }

    /// `request.start` — resolve or create the request's rollup and
    /// build the lifecycle-start event.
    pub fn request_start(
        &self,
        request_id: Option<RequestId>,
        trace_id: TraceId,
        span_id: Option<SpanId>,
        agent_id: AgentId,
        now: i64,
    ) -> (RequestId, AuditEventInput) {
        let id = self.resolve_or_create(request_id, trace_id.clone(), span_id.clone(), agent_id.clone(), now);
        let mut event = AuditEventInput::new(trace_id, agent_id, "request.start");
        event.span_id = span_id;
        event.payload = Some(serde_json::json!({ "requestId": id.as_str() }));
        (id, event)
    }

    /// `request.end` — remove the request's rollup and build the
    /// terminal event carrying every accumulated metric. `None` if the
    /// request id is unknown (already finished, or never started).
    pub fn request_end(&self, request_id: &RequestId, now: i64) -> Option<AuditEventInput> {
        let state = self.finish(request_id)?;
        let mut metrics = state.metrics;
        metrics.latency_ms = Some((now - state.start_ts).max(0) as u64);
        let mut event = AuditEventInput::new(state.trace_id, state.agent_id, "request.end");
        event.span_id = state.span_id;
        event.payload = Some(serde_json::json!({ "requestId": state.request_id.as_str() }));
        event.metrics = Some(metrics);
        Some(event)
    }

    /// `modelCallStart` — a candidate attempt began. Carries no
    /// counters of its own; folded for symmetry with the other domain
    /// operations and so a future caller that stamps per-attempt
    /// metrics on this event type gets picked up automatically.
    pub fn model_call_start(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `modelCallError` — a candidate attempt failed. Folds `retries`
    /// when the caller stamped one onto the event.
    pub fn model_call_error(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `modelCallFallback` — a candidate transition. Folds
    /// `fallback_hops` when the caller stamped one onto the event.
    pub fn model_call_fallback(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `modelCallEnd` — a routed call concluded. Folds tokens, cost,
    /// retries, and fallback hops from the event's metrics.
    pub fn model_call_end(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `routingDecision` — the router's terminal summary for one
    /// `route()` call. On the failure path this is the only
    /// metrics-bearing event for the call, so it is the fold point for
    /// `fallback_hops`/`retries`/`latency_ms` there.
    pub fn routing_decision(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `toolCallBlocked` — a tool call was evaluated by the guard
    /// pipeline. Folds `tool_calls` (always) and `blocked_tool_calls`
    /// (when the event says the call was blocked).
    pub fn tool_call_blocked(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `artifactPublish` — folds `artifacts_published`.
    pub fn artifact_publish(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `artifactFetch` — folds `artifacts_fetched`.
    pub fn artifact_fetch(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `agentMessage` — folds `delegation_messages`.
    pub fn agent_message(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `agentCallStart` — a synchronous delegation began.
    pub fn agent_call_start(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `agentCallEnd` — folds `delegation_calls`.
    pub fn agent_call_end(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `agentCallError` — a synchronous delegation failed.
    pub fn agent_call_error(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `pluginLifecycle` — a plugin load/unload event, for hosts that
    /// drive a plugin loader over this control plane.
    pub fn plugin_lifecycle(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }

    /// `skillLifecycle` — a skill load/unload event, for hosts that
    /// drive a skill loader over this control plane.
    pub fn skill_lifecycle(&self, request_id: &RequestId, event: AuditEventInput) -> AuditEventInput {
        self.observe(request_id, event)
    }
}
