//! Subscription filter predicate.

use arbiter_types::{AgentId, AuditEvent, DecisionOutcome, RiskTier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A subscriber's filter. Every populated field must match for an
/// event to pass; absent fields impose no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFilter {
    /// Match events from exactly this agent.
    pub agent_id: Option<AgentId>,
    /// Match events whose `event_type` is in this set.
    pub event_types: Option<HashSet<String>>,
    /// Match events whose model ref, from-model-ref, or to-model-ref is
    /// in this set.
    pub model_refs: Option<HashSet<String>>,
    /// Match events with this decision outcome.
    pub decision_outcome: Option<DecisionOutcome>,
    /// Match events whose risk tier is in this set.
    pub risk_tiers: Option<HashSet<RiskTier>>,
    /// Match events at or after this timestamp.
    pub since_ts: Option<i64>,
}

impl StreamFilter {
    /// Whether `event` satisfies this filter.
    ///
    /// When `model_refs` is populated but the event carries none of
    /// `modelRef`/`fromModelRef`/`toModelRef`, the event does not
    /// match — an unset exclusionary default, not a pass-through.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }
        if let Some(event_types) = &self.event_types {
            if !event_types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(model_refs) = &self.model_refs {
            let candidates: Vec<&String> = event
                .model
                .iter()
                .flat_map(|m| [&m.model_ref, &m.from_model_ref, &m.to_model_ref])
                .flatten()
                .collect();
            if candidates.is_empty() || !candidates.iter().any(|c| model_refs.contains(*c)) {
                return false;
            }
        }
        if let Some(outcome) = &self.decision_outcome {
            match &event.decision {
                Some(d) if &d.outcome == outcome => {}
                _ => return false,
            }
        }
        if let Some(risk_tiers) = &self.risk_tiers {
            match event.risk_tier {
                Some(tier) if risk_tiers.contains(&tier) => {}
                _ => return false,
            }
        }
        if let Some(since) = self.since_ts {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_types::{Decision, DecisionOutcome, ModelMeta, EVENT_VERSION, SCHEMA_VERSION};

    fn base_event() -> AuditEvent {
        AuditEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_version: EVENT_VERSION,
            timestamp: 1000,
            trace_id: "trace-1".into(),
            span_id: None,
            agent_id: "agent-a".into(),
            event_type: "model.call.end".to_string(),
            risk_tier: Some(RiskTier::Medium),
            decision: Some(Decision::allow()),
            model: Some(ModelMeta {
                model_ref: Some("gpt-4".to_string()),
                ..Default::default()
            }),
            tool: None,
            metrics: None,
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(StreamFilter::default().matches(&base_event()));
    }

    #[test]
    fn model_refs_filter_excludes_events_with_no_model_refs_at_all() {
        let mut filter = StreamFilter::default();
        filter.model_refs = Some(["gpt-4".to_string()].into_iter().collect());
        let mut event = base_event();
        event.model = None;
        assert!(!filter.matches(&event));
    }

    #[test]
    fn model_refs_filter_matches_from_or_to_model_ref() {
        let mut filter = StreamFilter::default();
        filter.model_refs = Some(["gpt-3.5".to_string()].into_iter().collect());
        let mut event = base_event();
        event.model = Some(ModelMeta {
            from_model_ref: Some("gpt-3.5".to_string()),
            ..Default::default()
        });
        assert!(filter.matches(&event));
    }

    #[test]
    fn since_ts_excludes_older_events() {
        let mut filter = StreamFilter::default();
        filter.since_ts = Some(2000);
        assert!(!filter.matches(&base_event()));
    }

    #[test]
    fn agent_id_mismatch_excludes() {
        let mut filter = StreamFilter::default();
        filter.agent_id = Some("agent-b".into());
        assert!(!filter.matches(&base_event()));
    }

    #[test]
    fn decision_outcome_mismatch_excludes() {
        let mut filter = StreamFilter::default();
        filter.decision_outcome = Some(DecisionOutcome::Deny);
        assert!(!filter.matches(&base_event()));
    }
}
