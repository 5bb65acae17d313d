//! # arbiter-delegation — the delegation and artifact gateway
//!
//! Exposes `artifacts.publish`/`artifacts.fetch`, `agents.message`
//! (async inbox handoff), and `agents.call` (synchronous delegation
//! bounded by recursion depth, call count, dedup, and pair-level rate
//! limiting) behind one [`DelegationGateway`].

#![deny(missing_docs)]

pub mod artifacts_rpc;
pub mod call;
pub mod collaborators;
pub mod gateway;
pub mod guard;
pub mod limits;
pub mod message;

pub use artifacts_rpc::ArtifactsPublishRequest;
pub use call::{AgentsCallRequest, AgentsCallResponse, CallStatus, SUMMARY_MAX_CHARS};
pub use collaborators::{AgentInvokeRequest, AgentRunner, ChatInjector, InboxMessage, JobSnapshot, Priority, SessionStore};
pub use gateway::DelegationGateway;
pub use guard::{task_hash, GuardCheck, PAIR_WINDOW_MS, TRACE_GUARD_IDLE_MS};
pub use limits::DelegationLimits;
pub use message::{AgentsMessageRequest, AgentsMessageResponse};
