//! Model-string aliasing and route decision heuristics.

use crate::candidate::RouteName;
use once_cell::sync::Lazy;
use regex::Regex;

/// Structured signals alongside a free-form message, used to bias the
/// route decision without relying on regex alone.
#[derive(Debug, Clone, Default)]
pub struct RouteSignals {
    /// The request touches a known repository/workspace.
    pub repo_context: bool,
    /// Tool names the caller expects to invoke.
    pub tool_requirements: Vec<String>,
    /// Caller-supplied explicit route hints (e.g. `"x"`, `"coding"`).
    pub explicit_tags: Vec<String>,
}

static CODING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(code|function|bug|compile|stack ?trace|refactor|unit test|diff|patch|repo|pull request)\b")
        .expect("valid regex")
});

static X_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(grok|x\.ai|xai|twitter/x post)\b").expect("valid regex"));

/// Collapses an `xai`/grok model string to its canonical form.
pub fn canonicalize_model_ref(provider: &str, model_ref: &str) -> (String, String) {
    if provider.eq_ignore_ascii_case("xai") || model_ref.to_ascii_lowercase().starts_with("grok") {
        let canonical = match model_ref.to_ascii_lowercase().as_str() {
            "grok" | "grok-latest" | "grok-beta" => "grok-2-latest",
            "grok-mini" | "grok-2-mini" => "grok-2-mini",
            other => other,
        };
        return ("xai".to_string(), canonical.to_string());
    }
    (provider.to_string(), model_ref.to_string())
}

/// Maps a free-form message plus structured signals onto one of the
/// three named routes.
pub fn decide_route(message: &str, signals: &RouteSignals, default_route: RouteName) -> RouteName {
    if signals
        .explicit_tags
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case("x"))
    {
        return RouteName::X;
    }
    if signals
        .explicit_tags
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case("coding"))
    {
        return RouteName::Coding;
    }
    if X_PATTERN.is_match(message) {
        return RouteName::X;
    }
    if signals.repo_context
        || !signals.tool_requirements.is_empty()
        || CODING_PATTERN.is_match(message)
    {
        return RouteName::Coding;
    }
    default_route
}
