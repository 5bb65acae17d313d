//! The shared RPC error envelope used by every entry point the core exposes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of error codes every RPC-style entry point returns.
///
/// Individual subsystems (policy, tool guard, artifacts, router,
/// delegation) define their own richer error enums for internal use;
/// at the boundary they all collapse to one of these four codes plus
/// a human-readable message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request failed schema or input validation.
    InvalidRequest,
    /// The subsystem needed to serve the request is disabled.
    Unavailable,
    /// A referenced entity (artifact, session, trace) does not exist.
    NotFound,
    /// An unexpected internal failure.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// Uniform error envelope returned by every RPC-style entry point.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// The error code.
    pub code: ErrorCode,
    /// A human-readable message.
    pub message: String,
}

impl RpcError {
    /// Construct a new RPC error envelope.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for `ErrorCode::InvalidRequest`.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Shorthand for `ErrorCode::NotFound`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Shorthand for `ErrorCode::Unavailable`.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Shorthand for `ErrorCode::Internal`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_shape() {
        let e = RpcError::not_found("artifact art_deadbeef not found");
        assert_eq!(e.to_string(), "NOT_FOUND: artifact art_deadbeef not found");
    }

    #[test]
    fn serializes_code_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InvalidRequest).unwrap();
        assert_eq!(json, "\"INVALID_REQUEST\"");
    }
}
