//! Typed ID wrappers for trace, span, request, and agent identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up trace IDs, agent IDs, etc.
/// These are just strings underneath — no UUID enforcement, no format
/// requirement. The core doesn't care what your IDs look like, only
/// that they are non-empty where an invariant requires it.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the underlying string is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(TraceId, "Identifier grouping every event emitted by one top-level agent request.");
typed_id!(SpanId, "Identifier for a sub-scope within a trace.");
typed_id!(RequestId, "Identifier for a single per-request rollup.");
typed_id!(AgentId, "Unique identifier for an agent, external to the core.");
