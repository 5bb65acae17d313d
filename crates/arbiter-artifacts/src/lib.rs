//! # arbiter-artifacts — content-addressed filesystem artifact store
//!
//! Payloads are identified by `art_` + the hex SHA-256 of their bytes.
//! Every write — payload, metadata, handoff brief — goes through a
//! temp-file-and-rename so a reader never observes a partially written
//! file.

#![deny(missing_docs)]

pub mod error;
pub mod id;
pub mod store;
pub mod types;

pub use error::ArtifactError;
pub use id::{compute_id, is_valid_id};
pub use store::{ArtifactStore, PublishRequest, AUTO_PUBLISH_THRESHOLD_FLOOR, DEFAULT_AUTO_PUBLISH_THRESHOLD};
pub use types::{
    ArtifactKind, ArtifactMetadata, FetchedArtifact, HandoffBrief, PublishResult,
    ARTIFACT_SCHEMA_VERSION,
};
