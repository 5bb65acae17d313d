//! The delegation gateway: owns the trace-guard registry and the
//! collaborators `agents.call`/`agents.message` drive.

use crate::collaborators::{AgentRunner, ChatInjector, SessionStore};
use crate::guard::TraceGuardRegistry;
use crate::limits::DelegationLimits;
use arbiter_artifacts::ArtifactStore;
use std::sync::Arc;

/// Exposes `artifacts.publish`/`artifacts.fetch`, `agents.message`,
/// and `agents.call` as a single RPC-style surface.
pub struct DelegationGateway {
    pub(crate) artifacts: Arc<ArtifactStore>,
    pub(crate) guards: Arc<TraceGuardRegistry>,
    pub(crate) runner: Arc<dyn AgentRunner>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) chat: Arc<dyn ChatInjector>,
    pub(crate) default_limits: DelegationLimits,
    pub(crate) auto_publish_threshold: Option<usize>,
}

impl DelegationGateway {
    /// Construct a gateway wired to its collaborators.
    pub fn new(
        artifacts: Arc<ArtifactStore>,
        runner: Arc<dyn AgentRunner>,
        sessions: Arc<dyn SessionStore>,
        chat: Arc<dyn ChatInjector>,
        default_limits: DelegationLimits,
    ) -> Self {
        Self {
            artifacts,
            guards: Arc::new(TraceGuardRegistry::new()),
            runner,
            sessions,
            chat,
            default_limits: default_limits.resolve(),
            auto_publish_threshold: None,
        }
    }

    /// Override the auto-publish threshold used when compacting long
    /// delegated messages.
    pub fn with_auto_publish_threshold(mut self, threshold: usize) -> Self {
        self.auto_publish_threshold = Some(threshold);
        self
    }

    /// The inbox session key a `to` agent's handoffs are upserted
    /// under, absent an explicit override.
    pub fn default_inbox_session_key(to: &str) -> String {
        format!("agent:{to}:inbox")
    }

    /// Drop trace guards idle for longer than their retention window.
    /// Callers should invoke this periodically (e.g. alongside the
    /// audit pipeline's own housekeeping).
    pub fn prune_idle_guards(&self, now: i64) {
        let before = self.guards.len();
        self.guards.prune_idle(now);
        let pruned = before.saturating_sub(self.guards.len());
        if pruned > 0 {
            tracing::debug!(pruned, "dropped idle trace guards");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_inbox_session_key_has_expected_shape() {
        assert_eq!(DelegationGateway::default_inbox_session_key("agent-b"), "agent:agent-b:inbox");
    }
}
