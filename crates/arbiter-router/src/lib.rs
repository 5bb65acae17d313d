//! # arbiter-router — model routing, fallback, and circuit-breaking
//!
//! Maps a free-form message to a route, narrows that route's candidate
//! list to what is enabled, capable, and allowlisted, then drives a
//! [`fallback::route_call`] across the survivors: skipping open
//! circuits and cooling-down providers, classifying failures into a
//! retry/terminal/abort taxonomy, and promoting to larger-context
//! candidates on overflow.

#![deny(missing_docs)]

pub mod alias;
pub mod candidate;
pub mod cooldown;
pub mod error;
pub mod fallback;
pub mod pricing;

pub use alias::{canonicalize_model_ref, decide_route, RouteSignals};
pub use candidate::{
    enforce_allowlist, filter_candidates, CandidateRemoval, ModelCandidate, RouteName, RouteSpec,
    RouterConfig,
};
pub use cooldown::CooldownTracker;
pub use error::{classify_error, RawModelError, RouteError};
pub use fallback::{route_call, AttemptRecord, ModelRunOutcome, ModelRunner, RouteContext, RouteFailure, RouteOutcome};
pub use pricing::{ModelPricing, PricingTable};
