//! End-to-end tests over the wired [`Arbiter`] facade: the seams
//! between subsystems (audit → stream, router/delegation → audit) are
//! what this crate adds, so these tests drive them through the real
//! facade rather than the individual subsystem crates.

use arbiter::config::ArbiterConfig;
use arbiter::core::Arbiter;
use arbiter_delegation::{AgentInvokeRequest, AgentRunner, AgentsCallRequest, ChatInjector, InboxMessage, JobSnapshot, SessionStore};
use arbiter_router::{ModelCandidate, ModelRunOutcome, ModelRunner, RawModelError, RouteContext};
use arbiter_types::RpcError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

struct StubRunner {
    snapshots: Mutex<HashMap<String, JobSnapshot>>,
    invocations: AtomicUsize,
}

impl StubRunner {
    fn new() -> Self {
        Self { snapshots: Mutex::new(HashMap::new()), invocations: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl AgentRunner for StubRunner {
    async fn invoke(&self, request: AgentInvokeRequest) -> Result<String, RpcError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let job_id = request.idempotency_key.clone();
        self.snapshots.lock().unwrap().insert(
            job_id.clone(),
            JobSnapshot { ok: true, session_key: "agent:worker:inbox".to_string(), error: None },
        );
        Ok(job_id)
    }

    async fn await_completion(&self, job_id: &str, _timeout_secs: u64) -> Option<JobSnapshot> {
        self.snapshots.lock().unwrap().get(job_id).cloned()
    }
}

struct StubSessions;

#[async_trait]
impl SessionStore for StubSessions {
    async fn latest_assistant_message(&self, _session_key: &str) -> Option<String> {
        Some("done".to_string())
    }

    async fn upsert_inbox(&self, _session_key: &str, _entry: &InboxMessage) -> Result<(), RpcError> {
        Ok(())
    }
}

struct StubChat;

#[async_trait]
impl ChatInjector for StubChat {
    async fn inject(&self, _session_key: &str, _message: &InboxMessage) -> Result<(), RpcError> {
        Ok(())
    }
}

async fn test_arbiter() -> Arc<Arbiter> {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ArbiterConfig::default();
    config.artifacts_dir = dir.path().join("artifacts");
    config.briefs_dir = dir.path().join("briefs");
    Arbiter::new(config, Arc::new(StubRunner::new()), Arc::new(StubSessions), Arc::new(StubChat)).await
}

/// Seed scenario 4: two identical `agents.call`s within the dedup
/// window produce one invocation and a `deduped` second response, and
/// the dedup event reaches a stream subscriber through the facade's
/// audit→stream wiring.
#[tokio::test]
async fn agents_call_dedup_reaches_the_stream() {
    let arbiter = test_arbiter().await;
    let mut rx = arbiter.stream().subscribe("sub-1", Default::default(), None, 0);

    let request = AgentsCallRequest {
        trace_id: "trace-1".to_string(),
        from_agent_id: "lead".to_string(),
        to_agent_id: "worker".to_string(),
        message: "do the thing".to_string(),
        artifact_ids: Vec::new(),
        session_key: None,
        limits: None,
    };

    let first = arbiter.agents_call(request.clone(), 0).await;
    assert_eq!(first.status, arbiter_delegation::CallStatus::Ok);

    let second = arbiter.agents_call(request, 1_000).await;
    assert_eq!(second.status, arbiter_delegation::CallStatus::Deduped);

    let snapshot = rx.recv().await.unwrap();
    assert!(matches!(snapshot, arbiter_stream::ServerMessage::Snapshot { .. }));
}

struct FlakyRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl ModelRunner for FlakyRunner {
    async fn run(&self, _provider: &str, _model_ref: &str) -> Result<ModelRunOutcome, RawModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            Err(RawModelError { message: "service unavailable".to_string(), status_code: Some(503), error_code: None, is_abort: false })
        } else {
            Ok(ModelRunOutcome { value: serde_json::json!("ok"), tokens_in: 10, tokens_out: 5 })
        }
    }
}

/// Seed scenario 1: a 503 on the primary falls back to the secondary,
/// and the routing audit events are enqueued through the facade.
#[tokio::test]
async fn route_falls_back_on_503_and_updates_rollups() {
    let arbiter = test_arbiter().await;
    let candidates = vec![
        ModelCandidate {
            provider: "openai".to_string(),
            model_ref: "gpt-4.1-mini".to_string(),
            context_window_tokens: Some(128_000),
            capabilities: Vec::new(),
        },
        ModelCandidate {
            provider: "anthropic".to_string(),
            model_ref: "claude-haiku-3-5".to_string(),
            context_window_tokens: Some(200_000),
            capabilities: Vec::new(),
        },
    ];
    let runner = FlakyRunner { calls: AtomicUsize::new(0) };
    let ctx = RouteContext { request_id: "req-1", trace_id: "trace-1", agent_id: "lead" };

    let outcome = arbiter.route(&candidates, &runner, ctx).await.unwrap();
    assert_eq!(outcome.value, serde_json::json!("ok"));
    assert_eq!(outcome.fallback_hops, 1);
    assert_eq!(outcome.chosen_model, "anthropic/claude-haiku-3-5");

    let by_model = arbiter.rollups().by_model_snapshot();
    assert!(by_model.contains_key(&("anthropic".to_string(), "claude-haiku-3-5".to_string())));
}

/// Resolving policy through the facade folds global, agent, and skill
/// layers the way a host relying on [`Arbiter::resolve_policy`] would
/// expect, without it needing to call `arbiter_policy::resolve` itself.
#[tokio::test]
async fn resolve_policy_folds_configured_layers() {
    use arbiter_policy::Capability;
    use std::collections::HashSet;

    let dir = tempfile::tempdir().unwrap();
    let mut config = ArbiterConfig::default();
    config.artifacts_dir = dir.path().join("artifacts");
    config.briefs_dir = dir.path().join("briefs");
    config.policy.agents.insert(
        "lead".to_string(),
        arbiter_policy::PolicyLayer {
            allow: Some(HashSet::from([Capability::NetworkFetch])),
            deny: None,
            allow_domains: Some(vec!["*.example.com".to_string()]),
            write_paths: None,
            require_approval: None,
        },
    );
    let arbiter = Arbiter::new(config, Arc::new(StubRunner::new()), Arc::new(StubSessions), Arc::new(StubChat)).await;

    let resolved = arbiter.resolve_policy(Some("lead"), None);
    assert_eq!(resolved.allow_domains, vec!["*.example.com".to_string()]);

    let other = arbiter.resolve_policy(Some("someone-else"), None);
    assert!(other.allow_domains.is_empty());
}
