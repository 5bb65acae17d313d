#![deny(missing_docs)]
//! # arbiter — control-plane facade
//!
//! Wires every subsystem crate — audit, observability, stream,
//! policy, tool guard, artifacts, router, delegation — behind one
//! [`Arbiter`] a host process constructs once and holds for the
//! lifetime of the runtime.
//!
//! Each subsystem crate is independently useful and knows nothing
//! about its neighbors; this crate is only the seams between them:
//! [`sink::FanoutSink`] bridges the audit pipeline's drain task into
//! the stream fanout, [`config::ArbiterConfig`] folds every
//! subsystem's own config type into one serde tree, and [`Arbiter`]
//! owns one instance of each and exposes the handful of operations a
//! host actually calls (routing a model call, authorizing a tool call,
//! delegating to another agent, resolving policy).

pub mod config;
pub mod core;
pub mod sink;
pub mod spend;

pub use config::{
    ArbiterConfig, AuditSurfaceConfig, ObservabilityConfig, PolicySurfaceConfig,
    SpendSurfaceConfig, StreamSurfaceConfig,
};
pub use core::Arbiter;
pub use sink::FanoutSink;
