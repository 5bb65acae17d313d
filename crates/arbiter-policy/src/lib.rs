//! # arbiter-policy — layered capability policy resolution
//!
//! Folds hardcoded defaults, a global policy, an agent policy, and a
//! skill policy into one [`ResolvedPolicy`], then authorizes individual
//! capability requests against it.

#![deny(missing_docs)]

pub mod domain;
pub mod evaluate;
pub mod path;
pub mod types;

pub use domain::{all_hosts_allowed, domain_matches, extract_candidate_hosts, normalize_domain};
pub use evaluate::{evaluate, evaluate_tool_call_access, EvaluationResult};
pub use path::{all_targets_contained, extract_patch_targets, extract_write_targets, is_contained};
pub use types::{hardcoded_defaults, resolve, Capability, PolicyLayer, ResolvedPolicy};
