//! `agents.call` — synchronous delegation with limits.

use crate::collaborators::AgentInvokeRequest;
use crate::gateway::DelegationGateway;
use crate::guard::{task_hash, GuardCheck};
use crate::limits::DelegationLimits;
use arbiter_artifacts::{ArtifactKind, PublishRequest};
use arbiter_types::{AuditEventInput, Metrics};
use sha2::{Digest, Sha256};

/// Maximum characters kept from the delegated agent's latest assistant
/// message before it is ellipsized.
pub const SUMMARY_MAX_CHARS: usize = 800;

/// Outcome status of one `agents.call`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The delegated agent completed successfully.
    Ok,
    /// No completion snapshot arrived within the timeout.
    Timeout,
    /// A completion snapshot arrived but reported failure.
    Error,
    /// A trace-guard limit refused the call before it started.
    Blocked,
    /// An identical call was already in flight within the dedup window.
    Deduped,
}

/// Input to `agents.call`.
#[derive(Debug, Clone)]
pub struct AgentsCallRequest {
    /// Trace this call belongs to.
    pub trace_id: String,
    /// Calling agent.
    pub from_agent_id: String,
    /// Delegated agent.
    pub to_agent_id: String,
    /// The message to delegate.
    pub message: String,
    /// Artifact ids the delegated agent should have access to.
    pub artifact_ids: Vec<String>,
    /// Session key identifying the conversational thread, if the
    /// caller already has one.
    pub session_key: Option<String>,
    /// Limit overrides merged over the gateway's defaults. `None`
    /// fields fall back to the gateway default.
    pub limits: Option<DelegationLimits>,
}

/// Result of `agents.call`.
#[derive(Debug, Clone)]
pub struct AgentsCallResponse {
    /// What happened.
    pub status: CallStatus,
    /// Why, when `status` is not `Ok`.
    pub reason: Option<String>,
    /// A truncated summary of the delegated agent's latest message.
    pub summary: Option<String>,
    /// Artifact ids relevant to this call, including any summary
    /// artifact published for it.
    pub artifact_ids: Vec<String>,
}

/// Deterministic idempotency key for one `agents.call` attempt, so a
/// retried `invoke` on the agent-execution collaborator does not
/// double-run the same delegated agent.
fn idempotency_key(trace_id: &str, from: &str, to: &str, now: i64) -> String {
    let digest = Sha256::digest(format!("{trace_id}:{from}:{to}:{now}").as_bytes());
    format!("{digest:x}")
}

fn ellipsize(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let truncated: String = message.chars().take(max_chars).collect();
    format!("{truncated}…")
}

impl DelegationGateway {
    /// Execute synchronous delegation with the full limit pipeline:
    /// depth, call-count, dedup, and pair rate checks before invoking
    /// the callee.
    pub async fn agents_call(
        &self,
        request: AgentsCallRequest,
        now: i64,
    ) -> (AgentsCallResponse, Vec<AuditEventInput>) {
        let mut audit = Vec::new();
        let limits = request.limits.unwrap_or(self.default_limits).resolve();
        let normalized_message = request.message.trim().to_string();
        let session_key = request
            .session_key
            .clone()
            .unwrap_or_else(|| DelegationGateway::default_inbox_session_key(&request.to_agent_id));

        let mut sorted_artifact_ids = request.artifact_ids.clone();
        sorted_artifact_ids.sort();
        let hash = task_hash(&request.to_agent_id, &normalized_message, &sorted_artifact_ids, &session_key);

        match self.guards.check_and_enter(&request.trace_id, &request.from_agent_id, &request.to_agent_id, &hash, &limits, now) {
            GuardCheck::Deduped => {
                return (
                    AgentsCallResponse {
                        status: CallStatus::Deduped,
                        reason: Some("duplicate call within dedupeWindowMs".to_string()),
                        summary: None,
                        artifact_ids: request.artifact_ids,
                    },
                    audit,
                );
            }
            GuardCheck::Blocked(reason) => {
                audit.push(base_event(&request, "agent.call.blocked", Some(reason.clone())));
                return (
                    AgentsCallResponse { status: CallStatus::Blocked, reason: Some(reason), summary: None, artifact_ids: request.artifact_ids },
                    audit,
                );
            }
            GuardCheck::Proceed => {}
        }

        let result = self.run_delegated_call(&request, &normalized_message, &session_key, &limits, now, &mut audit).await;
        self.guards.release(&request.trace_id, now);
        result
    }

    async fn run_delegated_call(
        &self,
        request: &AgentsCallRequest,
        normalized_message: &str,
        session_key: &str,
        limits: &DelegationLimits,
        now: i64,
        audit: &mut Vec<AuditEventInput>,
    ) -> (AgentsCallResponse, Vec<AuditEventInput>) {
        audit.push(base_event(request, "agent.call.start", None));

        let compacted = match self
            .artifacts
            .maybe_auto_publish_long_payload(normalized_message, &request.trace_id, &request.from_agent_id, &request.to_agent_id, self.auto_publish_threshold, now)
            .await
        {
            Ok(compacted) => compacted,
            Err(err) => {
                audit.push(base_event(request, "agent.call.error", Some(err.to_string())));
                return (
                    AgentsCallResponse { status: CallStatus::Error, reason: Some(err.to_string()), summary: None, artifact_ids: request.artifact_ids.clone() },
                    std::mem::take(audit),
                );
            }
        };
        let (outgoing_message, mut artifact_ids) = match compacted {
            Some((stub, artifact_id)) => {
                let mut ids = request.artifact_ids.clone();
                ids.push(artifact_id);
                (stub, ids)
            }
            None => (normalized_message.to_string(), request.artifact_ids.clone()),
        };

        let idempotency_key = idempotency_key(&request.trace_id, &request.from_agent_id, &request.to_agent_id, now);
        let invoke = AgentInvokeRequest {
            to: request.to_agent_id.as_str().into(),
            message: outgoing_message,
            idempotency_key,
            deliver: false,
            timeout_secs: limits.timeout_secs_ceil(),
        };

        let job_id = match self.runner.invoke(invoke).await {
            Ok(id) => id,
            Err(err) => {
                audit.push(base_event(request, "agent.call.error", Some(err.message.clone())));
                return (
                    AgentsCallResponse { status: CallStatus::Error, reason: Some(err.message), summary: None, artifact_ids },
                    std::mem::take(audit),
                );
            }
        };

        let snapshot = self.runner.await_completion(&job_id, limits.timeout_secs_ceil()).await;
        let (status, reason) = match &snapshot {
            None => (CallStatus::Timeout, Some("no completion snapshot within timeoutMs".to_string())),
            Some(snap) if snap.ok => (CallStatus::Ok, None),
            Some(snap) => (CallStatus::Error, snap.error.clone()),
        };

        let summary = if status == CallStatus::Ok {
            let session_key = snapshot.as_ref().map(|s| s.session_key.as_str()).unwrap_or(session_key);
            self.sessions.latest_assistant_message(session_key).await.map(|m| ellipsize(&m, SUMMARY_MAX_CHARS))
        } else {
            None
        };

        if let Some(summary_text) = &summary {
            let summary_bytes = serde_json::json!({ "summary": summary_text }).to_string().into_bytes();
            let publish_request = PublishRequest {
                kind: ArtifactKind::Json,
                bytes: &summary_bytes,
                creator_agent_id: &request.to_agent_id,
                trace_id: &request.trace_id,
                ttl_days: None,
            };
            if let Ok(publish) = self.artifacts.publish(publish_request, now).await {
                artifact_ids.push(publish.metadata.id);
            }
        }

        let _ = self
            .artifacts
            .write_handoff_brief(&arbiter_artifacts::HandoffBrief {
                trace_id: request.trace_id.clone(),
                from_agent_id: request.from_agent_id.clone(),
                to_agent_id: request.to_agent_id.clone(),
                artifact_id: artifact_ids.last().cloned().unwrap_or_default(),
                original_length: normalized_message.chars().count(),
                stub_message: summary.clone().unwrap_or_default(),
                created_at: now,
            })
            .await;

        let mut end_event = base_event(request, "agent.call.end", reason.clone());
        end_event.metrics = Some(Metrics { delegation_calls: 1, ..Default::default() });
        audit.push(end_event);
        if status != CallStatus::Ok {
            audit.push(base_event(request, "agent.call.error", reason.clone()));
        }

        (
            AgentsCallResponse { status, reason, summary, artifact_ids },
            std::mem::take(audit),
        )
    }
}

fn base_event(request: &AgentsCallRequest, event_type: &str, reason: Option<String>) -> AuditEventInput {
    let mut input = AuditEventInput::new(request.trace_id.as_str(), request.from_agent_id.as_str(), event_type);
    input.payload = Some(serde_json::json!({
        "to": request.to_agent_id,
        "reason": reason,
    }));
    input
}
