//! The composed configuration surface a host process loads to stand
//! up the control plane.
//!
//! Every field mirrors a subsystem's own `Config`/`RouterConfig`/
//! `DelegationLimits` type, folded into one serde tree so an operator
//! can load a single TOML/JSON file and fan it out during [`crate::Arbiter::new`].

use arbiter_audit::RedactionMode;
use arbiter_delegation::DelegationLimits;
use arbiter_observability::CircuitConfig;
use arbiter_policy::PolicyLayer;
use arbiter_router::{ModelPricing, RouterConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Audit sub-config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditSurfaceConfig {
    /// Whether the file sink is attached at all.
    pub enabled: bool,
    /// Directory day-partitioned JSONL files are written under.
    pub dir: Option<PathBuf>,
    /// Byte cap on a redacted payload before truncation.
    pub max_payload_bytes: usize,
    /// Bounded-queue capacity before the oldest event is dropped.
    pub max_queue_size: usize,
}

impl Default for AuditSurfaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_payload_bytes: 32 * 1024,
            max_queue_size: 10_000,
        }
    }
}

/// Spend summary sub-config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpendSurfaceConfig {
    /// Whether the spend summary/monthly append log is written at all.
    pub enabled: bool,
    /// Directory the monthly `YYYY-MM.jsonl` append log is written under.
    pub dir: Option<PathBuf>,
    /// Path to the always-current JSON summary file.
    pub summary_path: Option<PathBuf>,
    /// Per-`provider/model` pricing table.
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for SpendSurfaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            summary_path: None,
            pricing: HashMap::new(),
        }
    }
}

/// Stream fanout sub-config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamSurfaceConfig {
    /// Master enable switch for the observability stream.
    pub enabled: bool,
    /// Replay buffer retention window, in milliseconds.
    pub replay_window_ms: i64,
    /// Default per-second delivery cap for subscriptions that don't
    /// request their own.
    pub server_max_events_per_sec: u32,
    /// Backlog capacity per subscription.
    pub server_max_buffered_events: usize,
    /// Maximum serialized size of a single wire message, in bytes.
    /// Enforced by the transport the host process wires up; the
    /// fanout itself is transport-agnostic.
    pub message_max_bytes: usize,
}

impl Default for StreamSurfaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replay_window_ms: 300_000,
            server_max_events_per_sec: 20,
            server_max_buffered_events: 1_000,
            message_max_bytes: 256 * 1024,
        }
    }
}

/// The observability surface: audit, spend, health, and stream
/// sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Master enable switch. When `false`, audit events are still
    /// materialized (callers never see a different API) but nothing
    /// is persisted or streamed.
    pub enabled: bool,
    /// Debug mode: prefers [`RedactionMode::Debug`] when `true`.
    pub debug: bool,
    /// Redaction mode applied to every payload before persistence.
    pub redaction_mode: RedactionMode,
    /// Audit sink configuration.
    pub audit: AuditSurfaceConfig,
    /// Spend summary configuration.
    pub spend: SpendSurfaceConfig,
    /// Circuit breaker configuration (health thresholds).
    pub health: CircuitConfig,
    /// Stream fanout configuration.
    pub stream: StreamSurfaceConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            redaction_mode: RedactionMode::Debug,
            audit: AuditSurfaceConfig::default(),
            spend: SpendSurfaceConfig::default(),
            health: CircuitConfig::default(),
            stream: StreamSurfaceConfig::default(),
        }
    }
}

/// Policy surface: one global layer plus per-agent and per-skill
/// overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicySurfaceConfig {
    /// The global policy layer, folded first after hardcoded defaults.
    pub global: PolicyLayer,
    /// Per-agent policy overrides, keyed by agent id.
    pub agents: HashMap<String, PolicyLayer>,
    /// Per-skill policy overrides, keyed by skill name.
    pub skills: HashMap<String, PolicyLayer>,
}

/// The top-level configuration a host process loads to stand the
/// control plane up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArbiterConfig {
    /// Observability (audit, spend, health, stream).
    pub observability: ObservabilityConfig,
    /// Delegation gateway limits.
    pub delegation: DelegationLimits,
    /// Layered capability policy.
    pub policy: PolicySurfaceConfig,
    /// Model router configuration.
    pub router: RouterConfig,
    /// Where artifact payloads and metadata are stored.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Where handoff briefs are stored.
    #[serde(default = "default_briefs_dir")]
    pub briefs_dir: PathBuf,
    /// Auto-publish threshold override for oversized delegated
    /// payloads, in characters.
    pub auto_publish_threshold: Option<usize>,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("_shared/artifacts")
}

fn default_briefs_dir() -> PathBuf {
    PathBuf::from("_shared/briefs")
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig::default(),
            delegation: DelegationLimits::default(),
            policy: PolicySurfaceConfig::default(),
            router: RouterConfig::default(),
            artifacts_dir: default_artifacts_dir(),
            briefs_dir: default_briefs_dir(),
            auto_publish_threshold: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = ArbiterConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ArbiterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.artifacts_dir, config.artifacts_dir);
        assert_eq!(back.router.enabled, config.router.enabled);
    }

    #[test]
    fn defaults_match_spec_layout() {
        let config = ArbiterConfig::default();
        assert_eq!(config.artifacts_dir, PathBuf::from("_shared/artifacts"));
        assert_eq!(config.briefs_dir, PathBuf::from("_shared/briefs"));
        assert!(config.observability.stream.enabled);
        assert_eq!(config.observability.health.failure_threshold, 3);
    }
}
