//! Store error types

use halyard_types::ArtifactKey;
use thiserror::Error;

/// Errors surfaced by a [`crate::Store`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Artifact does not exist
    #[error("Not found: {0}")]
    NotFound(ArtifactKey),

    /// Create of an artifact that already exists
    #[error("Already exists: {0}")]
    AlreadyExists(ArtifactKey),

    /// Optimistic-concurrency version mismatch
    #[error("Conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: ArtifactKey,
        expected: u64,
        actual: u64,
    },

    /// Payload rejected by the store
    #[error("Invalid artifact {key}: {reason}")]
    Invalid { key: ArtifactKey, reason: String },

    /// Store could not be reached or failed the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::AlreadyExists(_))
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Conflict { .. } | StoreError::AlreadyExists(_)
        )
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
