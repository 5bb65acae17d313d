//! Per-call authorization.

use crate::domain::{all_hosts_allowed, extract_candidate_hosts};
use crate::path::{all_targets_contained, extract_write_targets};
use crate::types::{Capability, ResolvedPolicy};
use serde_json::Value;
use std::collections::HashSet;

/// The outcome of evaluating one capability request against a
/// resolved policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationResult {
    /// The request is authorized.
    Allow,
    /// The request is refused, with a short machine-readable reason.
    Deny {
        /// Why the request was refused, e.g. `"capability_denied"`,
        /// `"domain_not_allowed"`, `"path_not_contained"`.
        reason: &'static str,
    },
}

impl EvaluationResult {
    /// Whether this result is [`EvaluationResult::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, EvaluationResult::Allow)
    }
}

/// Evaluate a capability request against a resolved policy.
pub fn evaluate(policy: &ResolvedPolicy, capability: Capability, request: &Value) -> EvaluationResult {
    if !policy.capability_check(capability) {
        return EvaluationResult::Deny {
            reason: "capability_denied",
        };
    }
    match capability {
        Capability::NetworkFetch => {
            if policy.allow_domains.is_empty() {
                return EvaluationResult::Deny {
                    reason: "no_allowed_domains",
                };
            }
            let hosts = extract_candidate_hosts(request);
            if all_hosts_allowed(&hosts, &policy.allow_domains) {
                EvaluationResult::Allow
            } else {
                EvaluationResult::Deny {
                    reason: "domain_not_allowed",
                }
            }
        }
        Capability::FilesystemWrite => {
            if policy.write_paths.is_empty() {
                return EvaluationResult::Deny {
                    reason: "no_write_paths",
                };
            }
            let targets = extract_write_targets(request);
            if all_targets_contained(&targets, &policy.write_paths) {
                EvaluationResult::Allow
            } else {
                EvaluationResult::Deny {
                    reason: "path_not_contained",
                }
            }
        }
        _ => EvaluationResult::Allow,
    }
}

/// Verify the capability is declared in the skill manifest's capability
/// set before delegating to [`evaluate`].
pub fn evaluate_tool_call_access(
    policy: &ResolvedPolicy,
    capability: Capability,
    declared_capabilities: &HashSet<Capability>,
    request: &Value,
) -> EvaluationResult {
    if !declared_capabilities.contains(&capability) {
        return EvaluationResult::Deny {
            reason: "capability_not_declared",
        };
    }
    evaluate(policy, capability, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{resolve, PolicyLayer};
    use serde_json::json;

    fn policy_with(layer: PolicyLayer) -> ResolvedPolicy {
        resolve(&[Some(&layer)])
    }

    #[test]
    fn shell_exec_denied_when_capability_missing_from_allow_set() {
        let policy = policy_with(PolicyLayer {
            allow: Some([Capability::NetworkFetch].into_iter().collect()),
            ..Default::default()
        });
        assert!(!evaluate(&policy, Capability::ShellExec, &json!({})).is_allow());
    }

    #[test]
    fn network_fetch_requires_allow_domains_and_matching_host() {
        let policy = policy_with(PolicyLayer {
            allow: Some([Capability::NetworkFetch].into_iter().collect()),
            allow_domains: Some(vec!["*.example.com".to_string()]),
            ..Default::default()
        });
        assert!(evaluate(&policy, Capability::NetworkFetch, &json!({"url": "https://api.example.com"})).is_allow());
        assert_eq!(
            evaluate(&policy, Capability::NetworkFetch, &json!({"url": "https://evil.org"})),
            EvaluationResult::Deny { reason: "domain_not_allowed" }
        );
    }

    #[test]
    fn filesystem_write_requires_contained_target() {
        let policy = policy_with(PolicyLayer {
            allow: Some([Capability::FilesystemWrite].into_iter().collect()),
            write_paths: Some(vec!["/repo".to_string()]),
            ..Default::default()
        });
        assert!(evaluate(&policy, Capability::FilesystemWrite, &json!({"path": "/repo/a.rs"})).is_allow());
        assert_eq!(
            evaluate(&policy, Capability::FilesystemWrite, &json!({"path": "/etc/passwd"})),
            EvaluationResult::Deny { reason: "path_not_contained" }
        );
    }

    #[test]
    fn tool_call_access_requires_declared_capability() {
        let policy = policy_with(PolicyLayer {
            allow: Some([Capability::ToolInvoke].into_iter().collect()),
            ..Default::default()
        });
        let declared: HashSet<Capability> = [Capability::ModelInvoke].into_iter().collect();
        assert_eq!(
            evaluate_tool_call_access(&policy, Capability::ToolInvoke, &declared, &json!({})),
            EvaluationResult::Deny { reason: "capability_not_declared" }
        );
    }
}
