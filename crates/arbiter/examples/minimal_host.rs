//! Minimal host process wiring the control plane up and routing one
//! call through it.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example minimal_host -p arbiter
//! ```

use arbiter::config::ArbiterConfig;
use arbiter::core::Arbiter;
use arbiter_delegation::{AgentInvokeRequest, AgentRunner, ChatInjector, InboxMessage, JobSnapshot, SessionStore};
use arbiter_router::{ModelCandidate, ModelRunOutcome, ModelRunner, RawModelError, RouteContext};
use arbiter_types::RpcError;
use async_trait::async_trait;
use std::sync::Arc;

/// An [`AgentRunner`] that never actually delegates — a host wiring
/// this crate up without a real agent scheduler can start here and
/// replace it once one exists.
struct NoopAgentRunner;

#[async_trait]
impl AgentRunner for NoopAgentRunner {
    async fn invoke(&self, _request: AgentInvokeRequest) -> Result<String, RpcError> {
        Err(RpcError::unavailable("no agent scheduler wired up"))
    }

    async fn await_completion(&self, _job_id: &str, _timeout_secs: u64) -> Option<JobSnapshot> {
        None
    }
}

struct NoopSessions;

#[async_trait]
impl SessionStore for NoopSessions {
    async fn latest_assistant_message(&self, _session_key: &str) -> Option<String> {
        None
    }

    async fn upsert_inbox(&self, _session_key: &str, _entry: &InboxMessage) -> Result<(), RpcError> {
        Ok(())
    }
}

struct NoopChat;

#[async_trait]
impl ChatInjector for NoopChat {
    async fn inject(&self, _session_key: &str, _message: &InboxMessage) -> Result<(), RpcError> {
        Ok(())
    }
}

/// A [`ModelRunner`] that always succeeds, standing in for a real
/// provider SDK call.
struct EchoRunner;

#[async_trait]
impl ModelRunner for EchoRunner {
    async fn run(&self, provider: &str, model_ref: &str) -> Result<ModelRunOutcome, RawModelError> {
        Ok(ModelRunOutcome {
            value: serde_json::json!({ "provider": provider, "model": model_ref, "text": "hello" }),
            tokens_in: 12,
            tokens_out: 4,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(config, Arc::new(NoopAgentRunner), Arc::new(NoopSessions), Arc::new(NoopChat)).await;

    let candidates = vec![ModelCandidate {
        provider: "openai".to_string(),
        model_ref: "gpt-4.1-mini".to_string(),
        context_window_tokens: Some(128_000),
        capabilities: Vec::new(),
    }];
    let runner = EchoRunner;
    let ctx = RouteContext { request_id: "req-1", trace_id: "trace-1", agent_id: "demo-agent" };

    match arbiter.route(&candidates, &runner, ctx).await {
        Ok(outcome) => println!("routed to {}: {}", outcome.chosen_model, outcome.value),
        Err(err) => eprintln!("routing failed: {err}"),
    }

    arbiter.run_housekeeping(arbiter::core::now_ms());
    arbiter.shutdown().await;
}
