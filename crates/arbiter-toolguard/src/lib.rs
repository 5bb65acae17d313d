//! # arbiter-toolguard — authorization pipeline for tool calls
//!
//! Every tool call passes through four stages before it's allowed to
//! execute: per-scope rate limiting, policy evaluation, risk
//! classification, and an approval gate. The first stage to block the
//! call wins; nothing downstream runs.

#![deny(missing_docs)]

pub mod guard;
pub mod rate_limit;
pub mod risk;

pub use guard::{GuardConfig, GuardDecision, Stage, ToolCallRequest, ToolGuard};
pub use rate_limit::{RateLimitConfig, RateLimiter, Scope};
pub use risk::classify;
