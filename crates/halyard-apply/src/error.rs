//! Error types for the apply engine

use halyard_store::StoreError;
use halyard_types::ArtifactKey;
use thiserror::Error;

/// How an error should be handled by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Retry after a bounded backoff
    Transient,
    /// Sticky until the user fixes the input; re-evaluated on the next trigger
    Validation,
    /// Contract violation; never retried
    Fatal,
}

/// Apply engine error type
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Store request failed
    #[error("Failed to apply {key}: {source}")]
    Store {
        key: ArtifactKey,
        #[source]
        source: StoreError,
    },

    /// Version conflict persisted after a fresh read
    #[error("Conflict retries exhausted for {0}")]
    ConflictExhausted(ArtifactKey),

    /// Two artifacts in one sequence share an identity
    #[error("Duplicate artifact identity {0} in rendered component")]
    DuplicateIdentity(ArtifactKey),
}

impl ApplyError {
    pub fn store(key: &ArtifactKey, source: StoreError) -> Self {
        Self::Store {
            key: key.clone(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApplyError::Store { source, .. } => match source {
                StoreError::Invalid { .. } => ErrorClass::Validation,
                _ => ErrorClass::Transient,
            },
            ApplyError::ConflictExhausted(_) => ErrorClass::Transient,
            ApplyError::DuplicateIdentity(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Result type for apply operations
pub type ApplyResult<T> = std::result::Result<T, ApplyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_types::Kind;

    #[test]
    fn test_error_classes() {
        let key = ArtifactKey::cluster(Kind::Namespace, "ns");

        assert_eq!(
            ApplyError::ConflictExhausted(key.clone()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ApplyError::DuplicateIdentity(key.clone()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            ApplyError::store(
                &key,
                StoreError::Invalid {
                    key: key.clone(),
                    reason: "bad".into()
                }
            )
            .class(),
            ErrorClass::Validation
        );
        assert!(ApplyError::store(&key, StoreError::Unavailable("down".into())).is_retryable());
    }
}
