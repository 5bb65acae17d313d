//! Router-facing error taxonomy.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A raw failure reported by a model run, before classification.
#[derive(Debug, Clone)]
pub struct RawModelError {
    /// The provider-reported or transport-level message.
    pub message: String,
    /// HTTP-ish status code, if the failure came from a transport.
    pub status_code: Option<u16>,
    /// Provider-specific error code, if any.
    pub error_code: Option<String>,
    /// Whether the caller identifies this as an abort (deadline/cancel),
    /// not a model failure.
    pub is_abort: bool,
}

/// The classified outcome of a model run failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouteError {
    /// Caller-initiated abort (deadline or cancellation). Rethrown
    /// immediately; no fallback is attempted.
    #[error("aborted")]
    Abort,

    /// Authentication or allowlist rejection. No further candidates
    /// are tried.
    #[error("terminal: {0}")]
    Terminal(String),

    /// The candidate's context window was exceeded; routing should
    /// jump to a candidate with a strictly larger window.
    #[error("context length exceeded")]
    ContextOverflow,

    /// A transport-level failure recorded against the circuit with
    /// reason `timeout`.
    #[error("retryable transport failure: {0}")]
    RetryableTransport(String),

    /// The model's output failed tool-call/JSON parsing; reason
    /// `format`.
    #[error("tool call parse failure")]
    ToolCallParseFailure,

    /// Any other retryable failure (rate limits, etc.), carrying the
    /// reason to record against the circuit.
    #[error("retryable: {0}")]
    OtherRetryable(String),

    /// An unrecognized failure that is not retried.
    #[error("non-retryable: {0}")]
    NonRetryableUnknown(String),

    /// The candidate's circuit was open; skipped without an attempt.
    #[error("circuit open")]
    CircuitOpen,

    /// An unexpected internal failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl RouteError {
    /// The reason string recorded against the circuit breaker, when
    /// this error is the kind that updates circuit state.
    pub fn circuit_reason(&self) -> Option<&str> {
        match self {
            RouteError::RetryableTransport(_) => Some("timeout"),
            RouteError::ToolCallParseFailure => Some("format"),
            RouteError::OtherRetryable(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Whether routing should try the next candidate after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouteError::RetryableTransport(_)
                | RouteError::ToolCallParseFailure
                | RouteError::OtherRetryable(_)
                | RouteError::ContextOverflow
        )
    }
}

static TERMINAL_AUTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)invalid[_ ]api[_ ]key|incorrect api key|model not allowed|not in (the )?allowlist|allowlist rejection")
        .expect("valid regex")
});
static CONTEXT_OVERFLOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)context length exceeded|context_length_exceeded|maximum context length|context window exceeded")
        .expect("valid regex")
});
static TRANSPORT_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ECONNREFUSED|ECONNRESET|ETIMEDOUT|ESOCKETTIMEDOUT|EHOSTUNREACH|ENOTFOUND").expect("valid regex")
});
static TOOL_PARSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)failed to parse tool call|invalid tool call json|unexpected token.*tool|tool_call.*pars(e|ing)")
        .expect("valid regex")
});
static RATE_LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)rate.?limit|too many requests|\b429\b").expect("valid regex"));

/// Classify a raw model-run failure into the routing taxonomy. Pure
/// function over normalized error text — no I/O, no side effects.
pub fn classify_error(raw: &RawModelError) -> RouteError {
    if raw.is_abort {
        return RouteError::Abort;
    }
    let haystack = format!("{} {}", raw.message, raw.error_code.as_deref().unwrap_or(""));

    if TERMINAL_AUTH_RE.is_match(&haystack) {
        let lower = haystack.to_ascii_lowercase();
        let reason = if lower.contains("allowlist") || lower.contains("model not allowed") {
            "model_not_allowed"
        } else {
            "invalid_api_key"
        };
        return RouteError::Terminal(reason.to_string());
    }
    if CONTEXT_OVERFLOW_RE.is_match(&haystack) {
        return RouteError::ContextOverflow;
    }
    if raw.status_code.is_some_and(|s| s >= 500) || TRANSPORT_CODE_RE.is_match(&haystack) {
        return RouteError::RetryableTransport(raw.message.clone());
    }
    if TOOL_PARSE_RE.is_match(&haystack) {
        return RouteError::ToolCallParseFailure;
    }
    if raw.status_code == Some(429) || RATE_LIMIT_RE.is_match(&haystack) {
        return RouteError::OtherRetryable("rate_limit".to_string());
    }
    RouteError::NonRetryableUnknown(raw.message.clone())
}

#[cfg(test)]
mod classify_tests {
    use super::*;

    fn raw(message: &str) -> RawModelError {
        RawModelError {
            message: message.to_string(),
            status_code: None,
            error_code: None,
            is_abort: false,
        }
    }

    #[test]
    fn abort_takes_priority_over_message_content() {
        let mut err = raw("context length exceeded");
        err.is_abort = true;
        assert!(matches!(classify_error(&err), RouteError::Abort));
    }

    #[test]
    fn invalid_api_key_is_terminal() {
        match classify_error(&raw("Invalid API Key provided")) {
            RouteError::Terminal(reason) => assert_eq!(reason, "invalid_api_key"),
            other => panic!("expected Terminal, got {other:?}"),
        }
    }

    #[test]
    fn allowlist_rejection_is_terminal_model_not_allowed() {
        match classify_error(&raw("model not allowed for this account")) {
            RouteError::Terminal(reason) => assert_eq!(reason, "model_not_allowed"),
            other => panic!("expected Terminal, got {other:?}"),
        }
    }

    #[test]
    fn context_length_exceeded_is_context_overflow() {
        assert!(matches!(
            classify_error(&raw("context length exceeded for this model")),
            RouteError::ContextOverflow
        ));
    }

    #[test]
    fn http_503_is_retryable_transport() {
        let mut err = raw("service unavailable");
        err.status_code = Some(503);
        assert!(matches!(classify_error(&err), RouteError::RetryableTransport(_)));
    }

    #[test]
    fn econnrefused_is_retryable_transport() {
        assert!(matches!(
            classify_error(&raw("connect ECONNREFUSED 127.0.0.1:443")),
            RouteError::RetryableTransport(_)
        ));
    }

    #[test]
    fn tool_call_parse_failure_is_classified() {
        assert!(matches!(
            classify_error(&raw("failed to parse tool call arguments")),
            RouteError::ToolCallParseFailure
        ));
    }

    #[test]
    fn rate_limit_is_other_retryable() {
        match classify_error(&raw("you are being rate limited")) {
            RouteError::OtherRetryable(reason) => assert_eq!(reason, "rate_limit"),
            other => panic!("expected OtherRetryable, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_message_is_non_retryable_unknown() {
        assert!(matches!(
            classify_error(&raw("the sky fell")),
            RouteError::NonRetryableUnknown(_)
        ));
    }
}
