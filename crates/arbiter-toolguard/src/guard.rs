//! The tool guard pipeline: rate limit → policy → risk classification
//! → approval gate, short-circuiting on first block.

use crate::rate_limit::{RateLimiter, Scope};
use crate::risk::classify;
use arbiter_policy::{evaluate, Capability, EvaluationResult, ResolvedPolicy};
use arbiter_types::{AuditEventInput, Metrics, RiskTier};
use std::collections::{HashMap, HashSet};

/// A pending tool call awaiting authorization.
pub struct ToolCallRequest<'a> {
    /// Tool being invoked.
    pub tool_name: &'a str,
    /// The capability this tool call exercises.
    pub capability: Capability,
    /// Session the call belongs to.
    pub session_id: &'a str,
    /// Agent issuing the call.
    pub agent_id: &'a str,
    /// Trace the call belongs to, for audit correlation.
    pub trace_id: &'a str,
    /// The tool's JSON arguments, consulted by policy evaluation and
    /// risk classification.
    pub arguments: &'a serde_json::Value,
    /// Freeform command text, when the tool is `exec`/`bash`.
    pub command_text: Option<&'a str>,
}

/// Which pipeline stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Stage 1: per-scope rate limiting.
    RateLimit,
    /// Stage 2: policy evaluation.
    Policy,
    /// Stage 4: approval gate.
    ApprovalGate,
    /// No stage blocked the call.
    Allow,
}

impl Stage {
    /// Wire name for the audit payload's `stage` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RateLimit => "rate_limit",
            Stage::Policy => "policy",
            Stage::ApprovalGate => "approval_gate",
            Stage::Allow => "allow",
        }
    }
}

/// The outcome of running a call through the guard.
#[derive(Debug, Clone)]
pub struct GuardDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Which stage decided the outcome.
    pub stage: Stage,
    /// Machine-readable reason, present when `allowed` is false.
    pub reason: Option<&'static str>,
    /// The classified risk tier.
    pub risk_tier: RiskTier,
}

/// Guard configuration: rate limits, the tool names always treated as
/// high risk, and which risk tiers require approval regardless of
/// policy.
pub struct GuardConfig {
    /// Tools always classified as `high` risk.
    pub high_risk_tools: HashSet<String>,
    /// Risk tiers that require approval even when policy doesn't.
    pub tier_requires_approval: HashMap<RiskTier, bool>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        let mut tier_requires_approval = HashMap::new();
        tier_requires_approval.insert(RiskTier::Critical, true);
        Self {
            high_risk_tools: HashSet::new(),
            tier_requires_approval,
        }
    }
}

/// Delivers a best-effort system notice to a session when a call is
/// blocked or requires approval. Errors are swallowed by the caller —
/// a notice failing to send must never fail the guard decision.
pub trait SessionNotifier: Send + Sync {
    /// Attempt to notify `session_id` with `message`.
    fn notify(&self, session_id: &str, message: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Wires the four pipeline stages and emits the audit event each
/// decision requires.
pub struct ToolGuard {
    rate_limiter: RateLimiter,
    config: GuardConfig,
    notifier: Option<Box<dyn SessionNotifier>>,
}

impl ToolGuard {
    /// Build a guard over the given rate limiter and config.
    pub fn new(rate_limiter: RateLimiter, config: GuardConfig) -> Self {
        Self {
            rate_limiter,
            config,
            notifier: None,
        }
    }

    /// Attach a session notifier, invoked best-effort on deny/require-approval.
    pub fn with_notifier(mut self, notifier: Box<dyn SessionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn notify_best_effort(&self, session_id: &str, decision: &GuardDecision) {
        if decision.allowed {
            return;
        }
        if let Some(notifier) = &self.notifier {
            let message = format!(
                "tool call blocked at stage {}: {}",
                decision.stage.as_str(),
                decision.reason.unwrap_or("denied")
            );
            if let Err(err) = notifier.notify(session_id, &message) {
                tracing::debug!(error = %err, "best-effort session notice failed");
            }
        }
    }

    /// Authorize a tool call, given the already-resolved (global,
    /// tool-scoped) policy. Returns the decision and the
    /// [`AuditEventInput`] the caller should enqueue.
    pub fn evaluate(
        &self,
        request: &ToolCallRequest<'_>,
        policy: &ResolvedPolicy,
        now: i64,
    ) -> (GuardDecision, AuditEventInput) {
        if !self
            .rate_limiter
            .check_and_record(Scope::Session, request.session_id, request.tool_name, now)
        {
            let decision = GuardDecision {
                allowed: false,
                stage: Stage::RateLimit,
                reason: Some("rate_limited"),
                risk_tier: RiskTier::Low,
            };
            self.notify_best_effort(request.session_id, &decision);
            return (decision.clone(), self.audit_input(request, &decision));
        }

        if let EvaluationResult::Deny { reason } = evaluate(policy, request.capability, request.arguments) {
            let decision = GuardDecision {
                allowed: false,
                stage: Stage::Policy,
                reason: Some(reason),
                risk_tier: RiskTier::Low,
            };
            self.notify_best_effort(request.session_id, &decision);
            return (decision.clone(), self.audit_input(request, &decision));
        }

        let risk_tier = classify(request.tool_name, request.command_text, &self.config.high_risk_tools);

        let tier_requires_approval = self
            .config
            .tier_requires_approval
            .get(&risk_tier)
            .copied()
            .unwrap_or(false);
        if policy.require_approval || tier_requires_approval {
            let decision = GuardDecision {
                allowed: false,
                stage: Stage::ApprovalGate,
                reason: Some("require_approval"),
                risk_tier,
            };
            self.notify_best_effort(request.session_id, &decision);
            return (decision.clone(), self.audit_input(request, &decision));
        }

        let decision = GuardDecision {
            allowed: true,
            stage: Stage::Allow,
            reason: None,
            risk_tier,
        };
        (decision.clone(), self.audit_input(request, &decision))
    }

    fn audit_input(&self, request: &ToolCallRequest<'_>, decision: &GuardDecision) -> AuditEventInput {
        let mut input = AuditEventInput::new(request.trace_id, request.agent_id, "tool.call.guard");
        input.risk_tier = Some(decision.risk_tier);
        input.decision = Some(if decision.allowed {
            arbiter_types::Decision::allow()
        } else {
            arbiter_types::Decision::deny(decision.reason.unwrap_or("denied"))
        });
        input.tool = Some(arbiter_types::ToolMeta {
            tool_name: Some(request.tool_name.to_string()),
            tool_call_id: None,
            blocked: !decision.allowed,
        });
        input.metrics = Some(Metrics {
            tool_calls: 1,
            blocked_tool_calls: u32::from(!decision.allowed),
            ..Default::default()
        });
        input.payload = Some(serde_json::json!({ "stage": decision.stage.as_str() }));
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitConfig;
    use arbiter_policy::{hardcoded_defaults, PolicyLayer};

    fn request<'a>(tool_name: &'a str, arguments: &'a serde_json::Value) -> ToolCallRequest<'a> {
        ToolCallRequest {
            tool_name,
            capability: Capability::ToolInvoke,
            session_id: "sess-1",
            agent_id: "agent-a",
            trace_id: "trace-1",
            arguments,
            command_text: None,
        }
    }

    #[test]
    fn rate_limit_short_circuits_before_policy() {
        let guard = ToolGuard::new(
            RateLimiter::new(RateLimitConfig { max_calls: 0, window_ms: 1000 }),
            GuardConfig::default(),
        );
        let policy = hardcoded_defaults();
        let args = serde_json::json!({});
        let (decision, _) = guard.evaluate(&request("calculator", &args), &policy, 0);
        assert!(!decision.allowed);
        assert_eq!(decision.stage, Stage::RateLimit);
    }

    #[test]
    fn critical_risk_tier_requires_approval_by_default() {
        let guard = ToolGuard::new(
            RateLimiter::new(RateLimitConfig::default()),
            GuardConfig::default(),
        );
        let policy = arbiter_policy::resolve(&[Some(&PolicyLayer {
            allow: Some([Capability::ShellExec].into_iter().collect()),
            ..Default::default()
        })]);
        let args = serde_json::json!({});
        let mut req = request("bash", &args);
        req.capability = Capability::ShellExec;
        req.command_text = Some("dd if=/dev/zero of=/dev/sda");
        let (decision, _) = guard.evaluate(&req, &policy, 0);
        assert!(!decision.allowed);
        assert_eq!(decision.stage, Stage::ApprovalGate);
        assert_eq!(decision.risk_tier, RiskTier::Critical);
    }

    #[test]
    fn low_risk_allowed_tool_passes_through() {
        let guard = ToolGuard::new(
            RateLimiter::new(RateLimitConfig::default()),
            GuardConfig::default(),
        );
        let policy = arbiter_policy::resolve(&[Some(&PolicyLayer {
            allow: Some([Capability::ToolInvoke].into_iter().collect()),
            ..Default::default()
        })]);
        let args = serde_json::json!({});
        let (decision, input) = guard.evaluate(&request("calculator", &args), &policy, 0);
        assert!(decision.allowed);
        assert_eq!(decision.stage, Stage::Allow);
        assert_eq!(input.event_type.as_deref(), Some("tool.call.guard"));
    }
}
