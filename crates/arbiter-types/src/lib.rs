//! # arbiter-types — shared data model for the arbiter control plane
//!
//! Typed identifiers, the audit event schema, and the uniform RPC error
//! envelope that every other `arbiter-*` crate builds on.
//!
//! ## Design Principle
//!
//! IDs are newtypes over `String` so that a trace id can never be
//! passed where an agent id is expected, even though both are plain
//! strings at rest. Money is `rust_decimal::Decimal`, never `f64` —
//! spend rollups must not drift from floating-point rounding.

#![deny(missing_docs)]

pub mod duration;
pub mod error;
pub mod event;
pub mod id;

pub use duration::DurationMs;
pub use error::{ErrorCode, RpcError};
pub use event::{
    AuditEvent, AuditEventInput, Decision, DecisionOutcome, Metrics, ModelMeta, RequestState,
    RiskTier, ToolMeta, EVENT_VERSION, SCHEMA_VERSION,
};
pub use id::{AgentId, RequestId, SpanId, TraceId};
