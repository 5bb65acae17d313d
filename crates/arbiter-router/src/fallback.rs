//! The candidate-iteration engine: circuit/cooldown skips, retries,
//! context-overflow promotion, and termination.

use crate::candidate::ModelCandidate;
use crate::cooldown::CooldownTracker;
use crate::error::{classify_error, RawModelError, RouteError};
use crate::pricing::PricingTable;
use arbiter_observability::{CallOutcome, CircuitBreaker, Rollups};
use arbiter_types::{AuditEventInput, Decision, Metrics, ModelMeta};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// What a successful model run returns to the router: enough to
/// compute spend and hand the value back to the caller. The router
/// does not interpret `value` — it is whatever `runFn` produced.
#[derive(Debug, Clone)]
pub struct ModelRunOutcome {
    /// The caller-defined result of the call.
    pub value: serde_json::Value,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
}

/// The injected model-execution function. Implementations talk to
/// whatever provider SDK is configured; the router never does.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Attempt one call against `(provider, model_ref)`.
    async fn run(&self, provider: &str, model_ref: &str) -> Result<ModelRunOutcome, RawModelError>;
}

/// Ambient identifiers threaded through every audit event a routed
/// call emits.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext<'a> {
    /// The request this call belongs to, for the decision log.
    pub request_id: &'a str,
    /// Trace id, for audit correlation.
    pub trace_id: &'a str,
    /// Agent issuing the call.
    pub agent_id: &'a str,
}

/// One candidate attempted during a routed call, successful or not.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// The attempted candidate's key.
    pub candidate: String,
    /// `None` on success.
    pub error: Option<String>,
}

/// The result of a successfully routed call.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// The value `runFn` produced.
    pub value: serde_json::Value,
    /// The `provider/model` key that ultimately served the call.
    pub chosen_model: String,
    /// Number of candidate transitions taken.
    pub fallback_hops: u32,
    /// Number of retryable failures absorbed.
    pub retries: u32,
    /// Input tokens consumed by the winning attempt.
    pub tokens_in: u64,
    /// Output tokens produced by the winning attempt.
    pub tokens_out: u64,
    /// USD cost of the winning attempt.
    pub cost_usd: Decimal,
    /// Wall-clock latency for the whole routed call, in milliseconds.
    pub latency_ms: u64,
    /// Every candidate attempted, in order.
    pub attempts: Vec<AttemptRecord>,
    /// Audit events to enqueue, in emission order.
    pub audit: Vec<AuditEventInput>,
}

/// The result of an exhausted or aborted routed call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouteFailure {
    /// The caller aborted (deadline/cancellation); no fallback was attempted.
    #[error("aborted")]
    Abort,

    /// A terminal, user-actionable failure (auth or allowlist rejection).
    #[error("{0}")]
    Terminal(String),

    /// A non-retryable failure that wasn't classified as terminal but
    /// still stops iteration immediately.
    #[error("{0}")]
    NonRetryable(String),

    /// Every candidate was tried and failed, or context overflow had
    /// nowhere left to promote to.
    #[error("{0}")]
    AllFailed(String),
}

fn base_event(ctx: &RouteContext<'_>, event_type: &str) -> AuditEventInput {
    AuditEventInput::new(ctx.trace_id, ctx.agent_id, event_type)
}

fn model_event(
    ctx: &RouteContext<'_>,
    event_type: &str,
    candidate: &ModelCandidate,
    status_code: Option<u16>,
    error_code: Option<&str>,
) -> AuditEventInput {
    let mut input = base_event(ctx, event_type);
    input.model = Some(ModelMeta {
        provider: Some(candidate.provider.clone()),
        model_ref: Some(candidate.model_ref.clone()),
        status_code,
        error_code: error_code.map(str::to_string),
        from_model_ref: None,
        to_model_ref: None,
    });
    input
}

fn fallback_edge_event(ctx: &RouteContext<'_>, from: &ModelCandidate, to: &ModelCandidate, reason: &str) -> AuditEventInput {
    let mut input = base_event(ctx, "model.fallback");
    input.model = Some(ModelMeta {
        provider: Some(to.provider.clone()),
        model_ref: Some(to.model_ref.clone()),
        status_code: None,
        error_code: Some(reason.to_string()),
        from_model_ref: Some(from.key()),
        to_model_ref: Some(to.key()),
    });
    input
}

fn circuit_state_change_event(
    ctx: &RouteContext<'_>,
    candidate: &ModelCandidate,
    change: &arbiter_observability::StateChange,
) -> AuditEventInput {
    let mut input = base_event(ctx, "health.circuit.state_change");
    input.model = Some(ModelMeta {
        provider: Some(candidate.provider.clone()),
        model_ref: Some(candidate.model_ref.clone()),
        status_code: None,
        error_code: None,
        from_model_ref: None,
        to_model_ref: None,
    });
    input.payload = Some(serde_json::json!({
        "from": format!("{:?}", change.from).to_lowercase(),
        "to": format!("{:?}", change.to).to_lowercase(),
    }));
    input
}

#[allow(clippy::too_many_arguments)]
fn routing_decision_event(
    ctx: &RouteContext<'_>,
    chosen_model: Option<&str>,
    fallback_hops: u32,
    retries: u32,
    fail_reason: Option<&str>,
    latency_ms: u64,
    tokens_in: u64,
    tokens_out: u64,
) -> AuditEventInput {
    tracing::info!(
        request_id = ctx.request_id,
        chosen_model = chosen_model,
        fallback_hops,
        retries,
        fail_reason,
        latency_ms,
        tokens_in,
        tokens_out,
        "routing decision"
    );
    let mut input = base_event(ctx, "routing.decision");
    input.metrics = Some(Metrics {
        latency_ms: Some(latency_ms),
        tokens_in,
        tokens_out,
        fallback_hops,
        retries,
        ..Default::default()
    });
    input.payload = Some(serde_json::json!({
        "requestId": ctx.request_id,
        "chosenModel": chosen_model,
        "failReason": fail_reason,
    }));
    input
}

/// Route one call across `candidates` in order, retrying fallbacks per
/// the classified-error taxonomy.
///
/// `candidates[0]` is the primary; the allowlist and required-capability
/// filtering from step 1-2 must already have been applied by the caller
/// (see [`crate::candidate::filter_candidates`] and
/// [`crate::candidate::enforce_allowlist`]).
#[allow(clippy::too_many_arguments)]
pub async fn route_call(
    candidates: &[ModelCandidate],
    runner: &dyn ModelRunner,
    circuit: &CircuitBreaker,
    cooldowns: &CooldownTracker,
    rollups: &Rollups,
    pricing: &PricingTable,
    ctx: RouteContext<'_>,
) -> Result<RouteOutcome, (RouteFailure, Vec<AuditEventInput>)> {
    if candidates.is_empty() {
        return Err((RouteFailure::AllFailed("no candidates available".to_string()), Vec::new()));
    }

    let overall_start = Instant::now();
    let mut audit = Vec::new();
    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut fallback_hops: u32 = 0;
    let mut retries: u32 = 0;
    let mut idx = 0usize;

    while idx < candidates.len() {
        let candidate = &candidates[idx];
        let now = now_ms();

        let (can_attempt, change) = circuit.can_attempt(&candidate.provider, &candidate.model_ref, now);
        if let Some(change) = &change {
            audit.push(circuit_state_change_event(&ctx, candidate, change));
            rollups.set_circuit_state(&candidate.provider, &candidate.model_ref, change.to);
        }
        if !can_attempt {
            audit.push(model_event(&ctx, "model.call.error", candidate, None, Some("circuit_open")));
            attempts.push(AttemptRecord { candidate: candidate.key(), error: Some("circuit_open".to_string()) });
            idx = advance_with_fallback_edge(&ctx, candidates, idx, "circuit_open", &mut audit, rollups, &mut fallback_hops);
            continue;
        }

        if let Some(earliest) = cooldowns.all_in_cooldown(&candidate.provider, now) {
            let is_primary = idx == 0;
            let probe_ok = is_primary && cooldowns.probe_allowed("default", &candidate.provider, now, earliest);
            if !probe_ok {
                audit.push(model_event(&ctx, "model.call.error", candidate, None, Some("provider_cooldown")));
                attempts.push(AttemptRecord { candidate: candidate.key(), error: Some("provider_cooldown".to_string()) });
                idx = advance_with_fallback_edge(&ctx, candidates, idx, "provider_cooldown", &mut audit, rollups, &mut fallback_hops);
                continue;
            }
        }

        audit.push(model_event(&ctx, "model.call.start", candidate, None, None));
        let attempt_start = Instant::now();

        match runner.run(&candidate.provider, &candidate.model_ref).await {
            Ok(outcome) => {
                let latency_ms = attempt_start.elapsed().as_millis() as u64;
                let cost = pricing.cost(&candidate.key(), outcome.tokens_in, outcome.tokens_out);
                let change = circuit.note_success(&candidate.provider, &candidate.model_ref, now_ms());
                if let Some(change) = &change {
                    audit.push(circuit_state_change_event(&ctx, candidate, change));
                    rollups.set_circuit_state(&candidate.provider, &candidate.model_ref, change.to);
                }
                rollups.record_call(&CallOutcome {
                    provider: candidate.provider.clone(),
                    model_ref: candidate.model_ref.clone(),
                    agent_id: ctx.agent_id.to_string(),
                    tokens_in: outcome.tokens_in,
                    tokens_out: outcome.tokens_out,
                    cost_usd: cost,
                    success: true,
                    error: None,
                });

                let mut end_event = model_event(&ctx, "model.call.end", candidate, None, None);
                end_event.metrics = Some(Metrics {
                    latency_ms: Some(latency_ms),
                    tokens_in: outcome.tokens_in,
                    tokens_out: outcome.tokens_out,
                    cost_usd: Some(cost),
                    retries,
                    fallback_hops,
                    ..Default::default()
                });
                end_event.decision = Some(Decision::allow());
                audit.push(end_event);

                attempts.push(AttemptRecord { candidate: candidate.key(), error: None });
                let total_latency = overall_start.elapsed().as_millis() as u64;
                audit.push(routing_decision_event(
                    &ctx,
                    Some(&candidate.key()),
                    fallback_hops,
                    retries,
                    None,
                    total_latency,
                    outcome.tokens_in,
                    outcome.tokens_out,
                ));

                return Ok(RouteOutcome {
                    value: outcome.value,
                    chosen_model: candidate.key(),
                    fallback_hops,
                    retries,
                    tokens_in: outcome.tokens_in,
                    tokens_out: outcome.tokens_out,
                    cost_usd: cost,
                    latency_ms: total_latency,
                    attempts,
                    audit,
                });
            }
            Err(raw) => {
                let classified = classify_error(&raw);
                match classified {
                    RouteError::Abort => {
                        audit.push(model_event(&ctx, "model.call.error", candidate, raw.status_code, Some("abort")));
                        attempts.push(AttemptRecord { candidate: candidate.key(), error: Some("abort".to_string()) });
                        return Err((RouteFailure::Abort, audit));
                    }
                    RouteError::Terminal(reason) => {
                        audit.push(model_event(&ctx, "model.call.error", candidate, raw.status_code, Some(&reason)));
                        attempts.push(AttemptRecord { candidate: candidate.key(), error: Some(reason.clone()) });
                        let total_latency = overall_start.elapsed().as_millis() as u64;
                        audit.push(routing_decision_event(&ctx, None, fallback_hops, retries, Some(&reason), total_latency, 0, 0));
                        return Err((
                            RouteFailure::Terminal(format!("{reason}: authentication failed")),
                            audit,
                        ));
                    }
                    RouteError::ContextOverflow => {
                        audit.push(model_event(&ctx, "model.call.error", candidate, raw.status_code, Some("context_overflow")));
                        attempts.push(AttemptRecord { candidate: candidate.key(), error: Some("context_overflow".to_string()) });
                        match next_context_overflow_candidate(candidates, idx, candidate.context_window_tokens) {
                            Some(next) => {
                                audit.push(fallback_edge_event(&ctx, candidate, &candidates[next], "context_overflow"));
                                rollups.record_fallback_edge(&candidate.key(), &candidates[next].key());
                                fallback_hops += 1;
                                idx = next;
                            }
                            None => {
                                let total_latency = overall_start.elapsed().as_millis() as u64;
                                audit.push(routing_decision_event(
                                    &ctx,
                                    None,
                                    fallback_hops,
                                    retries,
                                    Some("context_overflow"),
                                    total_latency,
                                    0,
                                    0,
                                ));
                                return Err((
                                    RouteFailure::AllFailed(format!(
                                        "All models failed ({}): context window exhausted",
                                        attempts.len()
                                    )),
                                    audit,
                                ));
                            }
                        }
                    }
                    RouteError::NonRetryableUnknown(reason) => {
                        audit.push(model_event(&ctx, "model.call.error", candidate, raw.status_code, Some(&reason)));
                        attempts.push(AttemptRecord { candidate: candidate.key(), error: Some(reason.clone()) });
                        let total_latency = overall_start.elapsed().as_millis() as u64;
                        audit.push(routing_decision_event(&ctx, None, fallback_hops, retries, Some(&reason), total_latency, 0, 0));
                        return Err((RouteFailure::NonRetryable(reason), audit));
                    }
                    retryable => {
                        let reason = retryable.circuit_reason().unwrap_or("unknown").to_string();
                        audit.push(model_event(&ctx, "model.call.error", candidate, raw.status_code, Some(&reason)));
                        attempts.push(AttemptRecord { candidate: candidate.key(), error: Some(reason.clone()) });
                        let change = circuit.note_failure(&candidate.provider, &candidate.model_ref, &reason, now_ms());
                        if let Some(change) = &change {
                            audit.push(circuit_state_change_event(&ctx, candidate, change));
                            rollups.set_circuit_state(&candidate.provider, &candidate.model_ref, change.to);
                        }
                        rollups.record_call(&CallOutcome {
                            provider: candidate.provider.clone(),
                            model_ref: candidate.model_ref.clone(),
                            agent_id: ctx.agent_id.to_string(),
                            tokens_in: 0,
                            tokens_out: 0,
                            cost_usd: Decimal::ZERO,
                            success: false,
                            error: Some(reason.clone()),
                        });
                        retries += 1;
                        idx = advance_with_fallback_edge(&ctx, candidates, idx, &reason, &mut audit, rollups, &mut fallback_hops);
                    }
                }
            }
        }
    }

    let total_latency = overall_start.elapsed().as_millis() as u64;
    if attempts.len() == 1 {
        let reason = attempts[0].error.clone().unwrap_or_default();
        audit.push(routing_decision_event(&ctx, None, fallback_hops, retries, Some(&reason), total_latency, 0, 0));
        return Err((RouteFailure::AllFailed(reason), audit));
    }
    let summary = attempts
        .iter()
        .map(|a| format!("{}: {}", a.candidate, a.error.as_deref().unwrap_or("?")))
        .collect::<Vec<_>>()
        .join("; ");
    audit.push(routing_decision_event(&ctx, None, fallback_hops, retries, Some("exhausted"), total_latency, 0, 0));
    Err((
        RouteFailure::AllFailed(format!("All models failed ({}): {summary}", attempts.len())),
        audit,
    ))
}

fn advance_with_fallback_edge(
    ctx: &RouteContext<'_>,
    candidates: &[ModelCandidate],
    idx: usize,
    reason: &str,
    audit: &mut Vec<AuditEventInput>,
    rollups: &Rollups,
    fallback_hops: &mut u32,
) -> usize {
    if idx + 1 < candidates.len() {
        audit.push(fallback_edge_event(ctx, &candidates[idx], &candidates[idx + 1], reason));
        rollups.record_fallback_edge(&candidates[idx].key(), &candidates[idx + 1].key());
        *fallback_hops += 1;
    }
    idx + 1
}

/// Pick the next candidate to promote to on context overflow: the
/// first with a strictly larger known window, else the first with an
/// unknown window, else none.
fn next_context_overflow_candidate(
    candidates: &[ModelCandidate],
    failed_idx: usize,
    failed_window: Option<u64>,
) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .skip(failed_idx + 1)
        .find(|(_, c)| matches!((failed_window, c.context_window_tokens), (Some(cur), Some(w)) if w > cur))
        .or_else(|| {
            candidates
                .iter()
                .enumerate()
                .skip(failed_idx + 1)
                .find(|(_, c)| c.context_window_tokens.is_none())
        })
        .map(|(j, _)| j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_observability::CircuitConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn candidate(provider: &str, model_ref: &str, context_window_tokens: Option<u64>) -> ModelCandidate {
        ModelCandidate {
            provider: provider.to_string(),
            model_ref: model_ref.to_string(),
            context_window_tokens,
            capabilities: vec![],
        }
    }

    fn ctx<'a>() -> RouteContext<'a> {
        RouteContext { request_id: "req-1", trace_id: "trace-1", agent_id: "agent-a" }
    }

    struct ScriptedRunner {
        responses: StdMutex<Vec<Result<ModelRunOutcome, RawModelError>>>,
        calls: AtomicUsize,
        seen: StdMutex<Vec<(String, String)>>,
    }

    impl ScriptedRunner {
        fn new(mut responses: Vec<Result<ModelRunOutcome, RawModelError>>) -> Self {
            responses.reverse();
            Self { responses: StdMutex::new(responses), calls: AtomicUsize::new(0), seen: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ModelRunner for ScriptedRunner {
        async fn run(&self, provider: &str, model_ref: &str) -> Result<ModelRunOutcome, RawModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((provider.to_string(), model_ref.to_string()));
            self.responses.lock().unwrap().pop().expect("no scripted response left")
        }
    }

    fn transport_error(status: u16) -> RawModelError {
        RawModelError { message: "service unavailable".to_string(), status_code: Some(status), error_code: None, is_abort: false }
    }

    fn success(tokens_in: u64, tokens_out: u64) -> Result<ModelRunOutcome, RawModelError> {
        Ok(ModelRunOutcome { value: serde_json::json!("ok"), tokens_in, tokens_out })
    }

    #[tokio::test]
    async fn fallback_on_503_succeeds_on_second_candidate() {
        let candidates = vec![candidate("openai", "gpt-4.1-mini", None), candidate("anthropic", "claude-haiku-3-5", None)];
        let runner = ScriptedRunner::new(vec![Err(transport_error(503)), success(10, 5)]);
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let cooldowns = CooldownTracker::new();
        let rollups = Rollups::new();
        let pricing = PricingTable::default();

        let outcome = route_call(&candidates, &runner, &circuit, &cooldowns, &rollups, &pricing, ctx())
            .await
            .expect("should fall back and succeed");

        assert_eq!(outcome.value, serde_json::json!("ok"));
        assert_eq!(outcome.fallback_hops, 1);
        assert_eq!(outcome.chosen_model, "anthropic/claude-haiku-3-5");
        assert_eq!(runner.seen.lock().unwrap().as_slice(), &[
            ("openai".to_string(), "gpt-4.1-mini".to_string()),
            ("anthropic".to_string(), "claude-haiku-3-5".to_string()),
        ]);
        let types: Vec<&str> = outcome.audit.iter().map(|e| e.event_type.as_deref().unwrap()).collect();
        assert!(types.contains(&"model.call.error"));
        assert!(types.contains(&"model.fallback"));
        assert!(types.contains(&"model.call.end"));
    }

    #[tokio::test]
    async fn context_overflow_promotes_to_larger_window() {
        let candidates = vec![
            candidate("openai", "model-small", Some(8000)),
            candidate("openai", "model-large", Some(128_000)),
        ];
        let runner = ScriptedRunner::new(vec![
            Err(RawModelError { message: "context length exceeded".to_string(), status_code: None, error_code: None, is_abort: false }),
            success(100, 50),
        ]);
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let cooldowns = CooldownTracker::new();
        let rollups = Rollups::new();
        let pricing = PricingTable::default();

        let outcome = route_call(&candidates, &runner, &circuit, &cooldowns, &rollups, &pricing, ctx())
            .await
            .expect("should promote to the larger-window candidate");

        assert_eq!(outcome.chosen_model, "openai/model-large");
        assert_eq!(
            runner.seen.lock().unwrap().as_slice(),
            &[("openai".to_string(), "model-small".to_string()), ("openai".to_string(), "model-large".to_string())]
        );
    }

    #[tokio::test]
    async fn terminal_auth_error_does_not_try_fallback() {
        let candidates = vec![candidate("openai", "gpt-4", None), candidate("anthropic", "claude", None)];
        let runner = ScriptedRunner::new(vec![Err(RawModelError {
            message: "Invalid API Key".to_string(),
            status_code: Some(401),
            error_code: Some("invalid_api_key".to_string()),
            is_abort: false,
        })]);
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let cooldowns = CooldownTracker::new();
        let rollups = Rollups::new();
        let pricing = PricingTable::default();

        let (failure, _audit) = route_call(&candidates, &runner, &circuit, &cooldowns, &rollups, &pricing, ctx())
            .await
            .expect_err("should be terminal");

        match failure {
            RouteFailure::Terminal(msg) => assert!(msg.contains("authentication failed")),
            other => panic!("expected Terminal, got {other:?}"),
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_attempt_failure_rethrows_original_reason() {
        let candidates = vec![candidate("openai", "gpt-4", None)];
        let runner = ScriptedRunner::new(vec![Err(transport_error(500))]);
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let cooldowns = CooldownTracker::new();
        let rollups = Rollups::new();
        let pricing = PricingTable::default();

        let (failure, _audit) = route_call(&candidates, &runner, &circuit, &cooldowns, &rollups, &pricing, ctx())
            .await
            .expect_err("all candidates should fail");
        match failure {
            RouteFailure::AllFailed(reason) => assert_eq!(reason, "timeout"),
            other => panic!("expected AllFailed(single reason), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_circuit_is_skipped_without_an_attempt() {
        let candidates = vec![candidate("openai", "gpt-4", None), candidate("anthropic", "claude", None)];
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        for i in 0..3 {
            circuit.note_failure("openai", "gpt-4", "timeout", i * 1000);
        }
        let runner = ScriptedRunner::new(vec![success(1, 1)]);
        let cooldowns = CooldownTracker::new();
        let rollups = Rollups::new();
        let pricing = PricingTable::default();

        let outcome = route_call(&candidates, &runner, &circuit, &cooldowns, &rollups, &pricing, ctx())
            .await
            .expect("should skip open circuit and use fallback");
        assert_eq!(outcome.chosen_model, "anthropic/claude");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }
}
