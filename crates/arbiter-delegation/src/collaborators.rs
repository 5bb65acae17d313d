//! External collaborators the gateway invokes but does not implement
//! itself: the agent-execution runner and the session store behind
//! `agents.call`/`agents.message`.

use arbiter_types::{AgentId, RpcError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What `agents.call` asks the agent-execution collaborator to do.
#[derive(Debug, Clone)]
pub struct AgentInvokeRequest {
    /// The agent being delegated to.
    pub to: AgentId,
    /// The (possibly compacted) message body.
    pub message: String,
    /// Idempotency key so a retried invoke does not double-run.
    pub idempotency_key: String,
    /// Always `false` for `agents.call` — the caller awaits a snapshot
    /// rather than a push delivery.
    pub deliver: bool,
    /// Budget for the invocation, in whole seconds.
    pub timeout_secs: u64,
}

/// A completed (or failed) delegated job, as reported by the
/// agent-execution collaborator. Absence of a snapshot after the
/// timeout is reported as `None`, distinct from an error snapshot.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    /// Whether the delegated agent run completed successfully.
    pub ok: bool,
    /// Session key the delegated agent wrote its output under, for
    /// summarization from the session store.
    pub session_key: String,
    /// Failure detail, when `ok` is false.
    pub error: Option<String>,
}

/// Starts and awaits delegated agent runs. Implementations own however
/// agents are actually scheduled and executed; the gateway only needs
/// a job id to poll and a snapshot to summarize.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Start a delegated run, returning an opaque job id.
    async fn invoke(&self, request: AgentInvokeRequest) -> Result<String, RpcError>;

    /// Wait up to `timeout_secs` for the job to finish. `None` means
    /// no snapshot arrived in time.
    async fn await_completion(&self, job_id: &str, timeout_secs: u64) -> Option<JobSnapshot>;
}

/// Reads back what a delegated agent actually said, for summarization
/// and for `agents.message`'s inbox handoff.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The most recent assistant-authored message recorded under
    /// `session_key`, if any.
    async fn latest_assistant_message(&self, session_key: &str) -> Option<String>;

    /// Append or replace the inbox entry for `session_key`.
    async fn upsert_inbox(&self, session_key: &str, entry: &InboxMessage) -> Result<(), RpcError>;
}

/// How urgently an `agents.message` handoff should be surfaced.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low.
    Low,
    /// Normal (the default).
    Normal,
    /// High.
    High,
    /// Urgent.
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A normalized asynchronous handoff, delivered via `agents.message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Sending agent.
    pub from: AgentId,
    /// Receiving agent.
    pub to: AgentId,
    /// Trace this handoff belongs to.
    pub trace_id: String,
    /// Urgency.
    pub priority: Priority,
    /// The (possibly compacted) message body.
    pub body: String,
}

/// Injects a normalized inbox message into the receiving agent's live
/// chat surface.
#[async_trait]
pub trait ChatInjector: Send + Sync {
    /// Deliver `message` to whatever live surface `session_key` names.
    async fn inject(&self, session_key: &str, message: &InboxMessage) -> Result<(), RpcError>;
}
