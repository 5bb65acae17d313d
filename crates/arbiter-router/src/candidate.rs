//! Candidate model descriptions and the route-config shape they are
//! drawn from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the three message routes a free-form request can be mapped
/// to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteName {
    /// Code-authoring or code-reading requests.
    Coding,
    /// Requests explicitly tagged for the `x`/grok family.
    X,
    /// Everything else.
    Everyday,
}

/// A candidate model: what it's called and what it can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Provider name (`openai`, `anthropic`, `xai`, ...).
    pub provider: String,
    /// Model identifier within the provider, already alias-resolved.
    pub model_ref: String,
    /// Known context window, in tokens, if published for this model.
    pub context_window_tokens: Option<u64>,
    /// Capability tags this candidate is known to support.
    pub capabilities: Vec<String>,
}

impl ModelCandidate {
    /// The `provider/model_ref` key used for allowlists and spend rollups.
    pub fn key(&self) -> String {
        format!("{}/{}", self.provider, self.model_ref)
    }
}

/// Primary plus ordered fallbacks for one route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    /// The preferred candidate for this route.
    pub primary: ModelCandidate,
    /// Ordered fallback candidates, tried in order if the primary and
    /// earlier fallbacks fail.
    pub fallbacks: Vec<ModelCandidate>,
}

/// Router configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterConfig {
    /// Master enable switch.
    pub enabled: bool,
    /// Route used when no config is present or the message fails to
    /// classify into any named route.
    pub default_route: Option<RouteName>,
    /// Providers removed from every candidate list outright.
    pub disabled_providers: Vec<String>,
    /// Per-route primary/fallback specs.
    pub routes: HashMap<RouteName, RouteSpec>,
    /// Required capability tags a candidate must have to remain
    /// eligible; candidates failing this are removed with a rationale
    /// entry.
    pub required_capabilities: Vec<String>,
    /// Operator-declared `provider/model` allowlist. Empty means no
    /// enforcement.
    pub allowlist: Vec<String>,
}

/// Why a candidate was dropped while building the fallback list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRemoval {
    /// The dropped candidate's `provider/model_ref` key.
    pub candidate: String,
    /// Human-readable rationale.
    pub reason: String,
}

/// Remove disabled providers and candidates missing a required
/// capability, recording why each was dropped.
pub fn filter_candidates(
    candidates: Vec<ModelCandidate>,
    disabled_providers: &[String],
    required_capabilities: &[String],
) -> (Vec<ModelCandidate>, Vec<CandidateRemoval>) {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut removed = Vec::new();
    for candidate in candidates {
        if disabled_providers.iter().any(|p| p == &candidate.provider) {
            removed.push(CandidateRemoval {
                candidate: candidate.key(),
                reason: format!("provider {} is disabled", candidate.provider),
            });
            continue;
        }
        let missing: Vec<&str> = required_capabilities
            .iter()
            .map(String::as_str)
            .filter(|cap| !candidate.capabilities.iter().any(|c| c == cap))
            .collect();
        if !missing.is_empty() {
            removed.push(CandidateRemoval {
                candidate: candidate.key(),
                reason: format!("missing required capabilities: {}", missing.join(", ")),
            });
            continue;
        }
        kept.push(candidate);
    }
    (kept, removed)
}

/// Apply the allowlist: the primary (first candidate) always survives;
/// every other candidate must appear in `allowlist` (as `provider/model`)
/// or is dropped. An empty allowlist enforces nothing.
pub fn enforce_allowlist(mut candidates: Vec<ModelCandidate>, allowlist: &[String]) -> Vec<ModelCandidate> {
    if allowlist.is_empty() || candidates.is_empty() {
        return candidates;
    }
    let primary = candidates.remove(0);
    let fallbacks: Vec<ModelCandidate> = candidates
        .into_iter()
        .filter(|c| allowlist.iter().any(|entry| entry == &c.key()))
        .collect();
    let mut out = vec![primary];
    out.extend(fallbacks);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider: &str, model_ref: &str) -> ModelCandidate {
        ModelCandidate {
            provider: provider.to_string(),
            model_ref: model_ref.to_string(),
            context_window_tokens: None,
            capabilities: vec!["chat".to_string()],
        }
    }

    #[test]
    fn filter_drops_disabled_providers() {
        let (kept, removed) = filter_candidates(
            vec![candidate("openai", "gpt-4"), candidate("cohere", "command")],
            &["cohere".to_string()],
            &[],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(removed.len(), 1);
        assert!(removed[0].reason.contains("disabled"));
    }

    #[test]
    fn filter_drops_missing_capabilities() {
        let mut no_tools = candidate("openai", "gpt-3.5");
        no_tools.capabilities = vec![];
        let (kept, removed) = filter_candidates(
            vec![candidate("openai", "gpt-4"), no_tools],
            &[],
            &["chat".to_string()],
        );
        assert_eq!(kept.len(), 1);
        assert!(removed[0].reason.contains("missing required capabilities"));
    }

    #[test]
    fn allowlist_always_keeps_primary() {
        let candidates = vec![candidate("openai", "gpt-4"), candidate("cohere", "command")];
        let result = enforce_allowlist(candidates, &["anthropic/claude".to_string()]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].key(), "openai/gpt-4");
    }

    #[test]
    fn empty_allowlist_enforces_nothing() {
        let candidates = vec![candidate("openai", "gpt-4"), candidate("cohere", "command")];
        let result = enforce_allowlist(candidates, &[]);
        assert_eq!(result.len(), 2);
    }
}
