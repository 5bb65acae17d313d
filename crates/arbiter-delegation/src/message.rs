//! `agents.message` — asynchronous inbox handoff.

use crate::collaborators::{InboxMessage, Priority};
use crate::gateway::DelegationGateway;
use arbiter_types::{AuditEventInput, Metrics};

/// Input to `agents.message`.
#[derive(Debug, Clone)]
pub struct AgentsMessageRequest {
    /// Sending agent.
    pub from_agent_id: String,
    /// Receiving agent.
    pub to_agent_id: String,
    /// Trace this handoff belongs to.
    pub trace_id: String,
    /// Urgency; defaults to [`Priority::Normal`] when absent.
    pub priority: Option<Priority>,
    /// The message body.
    pub body: String,
    /// Inbox session key override. Defaults to
    /// [`DelegationGateway::default_inbox_session_key`].
    pub session_key: Option<String>,
}

/// Result of `agents.message`.
#[derive(Debug, Clone)]
pub struct AgentsMessageResponse {
    /// The (possibly compacted) artifact id, if the body was long
    /// enough to auto-publish.
    pub artifact_id: Option<String>,
    /// The session key the message was upserted under.
    pub session_key: String,
}

impl DelegationGateway {
    /// Normalize, compact, and deliver an asynchronous handoff to the
    /// target agent's inbox session.
    pub async fn agents_message(
        &self,
        request: AgentsMessageRequest,
        now: i64,
    ) -> Result<(AgentsMessageResponse, Vec<AuditEventInput>), arbiter_types::RpcError> {
        if request.from_agent_id.trim().is_empty() || request.to_agent_id.trim().is_empty() {
            return Err(arbiter_types::RpcError::invalid_request("from and to must be non-empty agent ids"));
        }

        let mut audit = Vec::new();
        let priority = request.priority.unwrap_or_default();
        let session_key = request
            .session_key
            .clone()
            .unwrap_or_else(|| DelegationGateway::default_inbox_session_key(&request.to_agent_id));
        let normalized_body = request.body.trim().to_string();

        let compacted = self
            .artifacts
            .maybe_auto_publish_long_payload(&normalized_body, &request.trace_id, &request.from_agent_id, &request.to_agent_id, self.auto_publish_threshold, now)
            .await
            .map_err(|err| arbiter_types::RpcError::internal(err.to_string()))?;

        let (outgoing_body, artifact_id) = match compacted {
            Some((stub, artifact_id)) => (stub, Some(artifact_id)),
            None => (normalized_body, None),
        };

        let inbox_message = InboxMessage {
            from: request.from_agent_id.as_str().into(),
            to: request.to_agent_id.as_str().into(),
            trace_id: request.trace_id.clone(),
            priority,
            body: outgoing_body,
        };

        self.sessions
            .upsert_inbox(&session_key, &inbox_message)
            .await
            .map_err(|err| arbiter_types::RpcError::internal(err.message))?;
        self.chat
            .inject(&session_key, &inbox_message)
            .await
            .map_err(|err| arbiter_types::RpcError::internal(err.message))?;

        let mut event = AuditEventInput::new(request.trace_id.as_str(), request.from_agent_id.as_str(), "agent.message");
        event.payload = Some(serde_json::json!({
            "to": request.to_agent_id,
            "priority": priority,
            "sessionKey": session_key,
        }));
        event.metrics = Some(Metrics { delegation_messages: 1, ..Default::default() });
        audit.push(event);

        Ok((AgentsMessageResponse { artifact_id, session_key }, audit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_defaults_to_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
