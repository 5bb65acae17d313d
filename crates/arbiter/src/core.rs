//! The [`Arbiter`]: owns one instance of every subsystem and exposes
//! the operations a host process actually calls.

use crate::config::ArbiterConfig;
use crate::sink::FanoutSink;
use arbiter_artifacts::ArtifactStore;
use arbiter_audit::{AuditConfig, AuditPipeline, AuditSink, CompositeSink, FileSink};
use arbiter_delegation::{
    AgentRunner, AgentsCallRequest, AgentsCallResponse, AgentsMessageRequest, AgentsMessageResponse,
    ArtifactsPublishRequest, ChatInjector, DelegationGateway, SessionStore,
};
use arbiter_observability::{CircuitBreaker, RequestAggregator, Rollups};
use arbiter_policy::{resolve as resolve_policy, Capability, EvaluationResult, PolicyLayer, ResolvedPolicy};
use arbiter_router::{
    route_call, CooldownTracker, ModelCandidate, ModelRunner, PricingTable, RouteContext, RouteFailure,
    RouteOutcome,
};
use arbiter_toolguard::{GuardConfig, GuardDecision, RateLimitConfig, RateLimiter, ToolCallRequest, ToolGuard};
use arbiter_artifacts::{ArtifactMetadata, FetchedArtifact};
use arbiter_types::{AgentId, AuditEventInput, Metrics, RpcError, TraceId};
use std::sync::Arc;

/// Everything a host process needs to stand the control plane up: one
/// instance of each subsystem, wired together.
pub struct Arbiter {
    config: ArbiterConfig,
    audit: Arc<AuditPipeline>,
    stream: Arc<arbiter_stream::StreamFanout>,
    aggregator: RequestAggregator,
    circuit: CircuitBreaker,
    rollups: Rollups,
    cooldowns: CooldownTracker,
    pricing: PricingTable,
    tool_guard: ToolGuard,
    artifacts: Arc<ArtifactStore>,
    delegation: DelegationGateway,
}

impl Arbiter {
    /// Build and start every subsystem. The audit pipeline's drain
    /// task is spawned as part of construction; call
    /// [`Arbiter::shutdown`] to stop it cleanly.
    pub async fn new(
        config: ArbiterConfig,
        runner: Arc<dyn AgentRunner>,
        sessions: Arc<dyn SessionStore>,
        chat: Arc<dyn ChatInjector>,
    ) -> Arc<Self> {
        let stream = Arc::new(arbiter_stream::StreamFanout::new(
            arbiter_stream::FanoutConfig {
                server_max_events_per_sec: config.observability.stream.server_max_events_per_sec,
                server_max_buffered_events: config.observability.stream.server_max_buffered_events,
            },
            arbiter_stream::ReplayConfig {
                max_buffered_events: config.observability.stream.server_max_buffered_events,
                replay_window_ms: config.observability.stream.replay_window_ms,
            },
        ));

        let sink: Arc<dyn AuditSink> = {
            let mut sinks: Vec<Box<dyn AuditSink>> = Vec::new();
            if config.observability.audit.enabled {
                if let Some(dir) = &config.observability.audit.dir {
                    sinks.push(Box::new(FileSink::new(dir.clone())));
                }
            }
            if config.observability.stream.enabled {
                sinks.push(Box::new(FanoutSink::new(stream.clone())));
            }
            Arc::new(CompositeSink::new(sinks))
        };

        let redaction_mode = if config.observability.debug {
            arbiter_audit::RedactionMode::Debug
        } else {
            config.observability.redaction_mode
        };
        let audit_config = AuditConfig {
            max_queue_len: config.observability.audit.max_queue_size,
            redaction_mode,
            max_payload_bytes: config.observability.audit.max_payload_bytes,
            log_dir: config.observability.audit.dir.clone(),
            ..AuditConfig::default()
        }
        .resolve();
        let audit = Arc::new(AuditPipeline::new(audit_config, sink));
        audit.start().await;

        let pricing = PricingTable::new(config.observability.spend.pricing.clone());
        let artifacts = Arc::new(ArtifactStore::new(config.artifacts_dir.clone(), config.briefs_dir.clone()));

        let mut delegation = DelegationGateway::new(artifacts.clone(), runner, sessions, chat, config.delegation);
        if let Some(threshold) = config.auto_publish_threshold {
            delegation = delegation.with_auto_publish_threshold(threshold);
        }

        let tool_guard = ToolGuard::new(RateLimiter::new(RateLimitConfig::default()), GuardConfig::default());

        Arc::new(Self {
            circuit: CircuitBreaker::new(config.observability.health),
            aggregator: RequestAggregator::new(),
            rollups: Rollups::new(),
            cooldowns: CooldownTracker::new(),
            pricing,
            tool_guard,
            artifacts,
            delegation,
            stream,
            audit,
            config,
        })
    }

    /// The configuration this instance was built from.
    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// The live observability stream, for registering subscriptions.
    pub fn stream(&self) -> &Arc<arbiter_stream::StreamFanout> {
        &self.stream
    }

    /// Per-request metrics aggregation.
    pub fn aggregator(&self) -> &RequestAggregator {
        &self.aggregator
    }

    /// Spend and health rollups.
    pub fn rollups(&self) -> &Rollups {
        &self.rollups
    }

    /// Stop the audit pipeline's drain task, flushing whatever is queued.
    pub async fn shutdown(&self) {
        self.audit.close().await;
    }

    /// Fold the global, per-agent, and per-skill policy layers into
    /// one resolved policy.
    pub fn resolve_policy(&self, agent_id: Option<&str>, skill: Option<&str>) -> ResolvedPolicy {
        let global: Option<&PolicyLayer> = Some(&self.config.policy.global);
        let agent = agent_id.and_then(|id| self.config.policy.agents.get(id));
        let skill = skill.and_then(|name| self.config.policy.skills.get(name));
        resolve_policy(&[global, agent, skill])
    }

    /// Authorize a tool call against the resolved policy for its
    /// agent and skill, folding the call into its request's counter
    /// rollup and enqueueing the resulting audit event.
    pub fn authorize_tool_call(&self, request: &ToolCallRequest<'_>, skill: Option<&str>, now: i64) -> GuardDecision {
        let policy = self.resolve_policy(Some(request.agent_id), skill);
        let (decision, audit_input) = self.tool_guard.evaluate(request, &policy, now);
        let request_id = self.aggregator.resolve_or_create(
            None,
            TraceId::from(request.trace_id),
            None,
            AgentId::from(request.agent_id),
            now,
        );
        let audit_input = self.aggregator.tool_call_blocked(&request_id, audit_input);
        self.audit.enqueue(audit_input);
        decision
    }

    /// Check a capability directly against resolved policy, without
    /// the rate-limit/risk/approval stages (used by callers that only
    /// need a yes/no on e.g. `network.fetch`).
    pub fn authorize_capability(&self, policy: &ResolvedPolicy, capability: Capability, arguments: &serde_json::Value) -> EvaluationResult {
        arbiter_policy::evaluate(policy, capability, arguments)
    }

    /// Route a model call across `candidates`, updating circuits,
    /// cooldowns, and rollups, folding the call's counters into its
    /// request rollup, and enqueueing every audit event the router and
    /// the `request.start`/`request.end` lifecycle produced along the
    /// way.
    pub async fn route(
        &self,
        candidates: &[ModelCandidate],
        runner: &dyn ModelRunner,
        ctx: RouteContext<'_>,
    ) -> Result<RouteOutcome, RouteFailure> {
        let now = now_ms();
        let (request_id, start_event) = self.aggregator.request_start(
            Some(arbiter_types::RequestId::from(ctx.request_id)),
            TraceId::from(ctx.trace_id),
            None,
            AgentId::from(ctx.agent_id),
            now,
        );
        self.audit.enqueue(start_event);

        let result = route_call(candidates, runner, &self.circuit, &self.cooldowns, &self.rollups, &self.pricing, ctx).await;
        match result {
            Ok(outcome) => {
                for input in &outcome.audit {
                    let enriched = match input.event_type.as_deref() {
                        Some("model.call.start") => self.aggregator.model_call_start(&request_id, input.clone()),
                        Some("model.call.end") => self.aggregator.model_call_end(&request_id, input.clone()),
                        Some("model.fallback") => self.aggregator.model_call_fallback(&request_id, input.clone()),
                        _ => input.clone(),
                    };
                    self.audit.enqueue(enriched);
                }
                if let Some(end_event) = self.aggregator.request_end(&request_id, now_ms()) {
                    self.audit.enqueue(end_event);
                }
                Ok(outcome)
            }
            Err((failure, audit)) => {
                for input in audit {
                    let enriched = match input.event_type.as_deref() {
                        Some("model.call.error") => self.aggregator.model_call_error(&request_id, input),
                        Some("model.fallback") => self.aggregator.model_call_fallback(&request_id, input),
                        Some("routing.decision") => self.aggregator.routing_decision(&request_id, input),
                        _ => input,
                    };
                    self.audit.enqueue(enriched);
                }
                if let Some(end_event) = self.aggregator.request_end(&request_id, now_ms()) {
                    self.audit.enqueue(end_event);
                }
                Err(failure)
            }
        }
    }

    /// Execute synchronous delegation, folding the call into its
    /// request's counter rollup and closing the rollup once the call
    /// settles.
    pub async fn agents_call(&self, request: AgentsCallRequest, now: i64) -> AgentsCallResponse {
        let trace_id = TraceId::from(request.trace_id.as_str());
        let agent_id = AgentId::from(request.from_agent_id.as_str());
        let (request_id, start_event) = self.aggregator.request_start(None, trace_id, None, agent_id, now);
        self.audit.enqueue(start_event);

        let (response, audit) = self.delegation.agents_call(request, now).await;
        for input in audit {
            let enriched = match input.event_type.as_deref() {
                Some("agent.call.start") => self.aggregator.agent_call_start(&request_id, input),
                Some("agent.call.end") => self.aggregator.agent_call_end(&request_id, input),
                Some("agent.call.error") => self.aggregator.agent_call_error(&request_id, input),
                _ => input,
            };
            self.audit.enqueue(enriched);
        }
        if let Some(end_event) = self.aggregator.request_end(&request_id, now) {
            self.audit.enqueue(end_event);
        }
        response
    }

    /// Deliver an asynchronous handoff, folding it into its request's
    /// counter rollup.
    pub async fn agents_message(&self, request: AgentsMessageRequest, now: i64) -> Result<AgentsMessageResponse, RpcError> {
        let trace_id = TraceId::from(request.trace_id.as_str());
        let agent_id = AgentId::from(request.from_agent_id.as_str());
        let (request_id, start_event) = self.aggregator.request_start(None, trace_id, None, agent_id, now);
        self.audit.enqueue(start_event);

        let (response, audit) = self.delegation.agents_message(request, now).await?;
        for input in audit {
            let enriched = match input.event_type.as_deref() {
                Some("agent.message") => self.aggregator.agent_message(&request_id, input),
                _ => input,
            };
            self.audit.enqueue(enriched);
        }
        if let Some(end_event) = self.aggregator.request_end(&request_id, now) {
            self.audit.enqueue(end_event);
        }
        Ok(response)
    }

    /// Publish an artifact, folding `artifacts_published` into the
    /// publishing agent's in-flight request rollup (or starting a new
    /// one if this call is not nested inside an ongoing request).
    pub async fn artifacts_publish(&self, request: ArtifactsPublishRequest, now: i64) -> Result<ArtifactMetadata, RpcError> {
        let trace_id = TraceId::from(request.trace_id.as_str());
        let agent_id = AgentId::from(request.creator_agent_id.as_str());
        let metadata = self.delegation.artifacts_publish(request, now).await?;

        let request_id = self.aggregator.resolve_or_create(None, trace_id.clone(), None, agent_id.clone(), now);
        let mut event = AuditEventInput::new(trace_id, agent_id, "artifact.publish");
        event.metrics = Some(Metrics { artifacts_published: 1, ..Default::default() });
        event.payload = Some(serde_json::json!({ "artifactId": metadata.id }));
        let event = self.aggregator.artifact_publish(&request_id, event);
        self.audit.enqueue(event);
        Ok(metadata)
    }

    /// Fetch an artifact, folding `artifacts_fetched` into the
    /// publishing trace's in-flight request rollup. The fetching
    /// agent's own identity is not known to this RPC, so the event is
    /// attributed to the artifact's original trace/creator.
    pub async fn artifacts_fetch(&self, id: &str) -> Result<FetchedArtifact, RpcError> {
        let fetched = self.delegation.artifacts_fetch(id).await?;

        let trace_id = TraceId::from(fetched.metadata.trace_id.as_str());
        let agent_id = AgentId::from(fetched.metadata.creator_agent_id.as_str());
        let request_id = self.aggregator.resolve_or_create(None, trace_id.clone(), None, agent_id.clone(), now_ms());
        let mut event = AuditEventInput::new(trace_id, agent_id, "artifact.fetch");
        event.metrics = Some(Metrics { artifacts_fetched: 1, ..Default::default() });
        event.payload = Some(serde_json::json!({ "artifactId": fetched.metadata.id }));
        let event = self.aggregator.artifact_fetch(&request_id, event);
        self.audit.enqueue(event);
        Ok(fetched)
    }

    /// Run the opportunistic housekeeping pass: drop idle trace
    /// guards, prune stale cooldown probes, and rebroadcast dirty
    /// spend/health rollups to subscribers.
    pub fn run_housekeeping(&self, now: i64) {
        self.delegation.prune_idle_guards(now);
        self.cooldowns.prune_stale_probes(now);
        self.stream.maybe_rebroadcast_rollups(&self.rollups, now);
    }

    /// Write the always-current spend summary and append this
    /// period's totals to the monthly log.
    pub async fn write_spend_summary(&self, now_ms: i64) -> std::io::Result<()> {
        if !self.config.observability.spend.enabled {
            return Ok(());
        }
        crate::spend::write_spend_summary(
            &self.config.observability.spend,
            &self.rollups,
            now_ms,
        )
        .await
    }
}

/// Current time in epoch milliseconds, for callers that don't already
/// track a clock of their own.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
