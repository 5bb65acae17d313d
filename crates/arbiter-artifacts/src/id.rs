//! Content-addressed artifact ids.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static ARTIFACT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^art_[0-9a-f]{64}$").expect("static artifact id pattern is valid"));

/// Compute the artifact id for a payload's raw bytes: `art_` followed
/// by the hex-encoded SHA-256 digest.
pub fn compute_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("art_{:x}", hasher.finalize())
}

/// Whether `id` matches the artifact id shape.
pub fn is_valid_id(id: &str) -> bool {
    ARTIFACT_ID_RE.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_id_is_stable_and_shaped_correctly() {
        let id = compute_id(b"hello world");
        assert!(is_valid_id(&id));
        assert_eq!(id, compute_id(b"hello world"));
    }

    #[test]
    fn different_payloads_produce_different_ids() {
        assert_ne!(compute_id(b"a"), compute_id(b"b"));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_id("art_short"));
        assert!(!is_valid_id("not_an_artifact_id"));
        assert!(!is_valid_id(&format!("art_{}", "g".repeat(64))));
    }
}
