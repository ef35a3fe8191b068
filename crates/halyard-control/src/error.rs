//! Error types for the control layer

use halyard_apply::{ApplyError, ErrorClass};
use halyard_store::StoreError;
use halyard_types::SubsystemId;
use thiserror::Error;

/// Control layer error type
#[derive(Debug, Error)]
pub enum ControlError {
    /// Reading an input failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Applying or tearing down artifacts failed
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// The configuration record or one of its inputs is malformed
    #[error("{reason}")]
    Invalid { reason: String, detail: String },

    /// An input the renderer needs does not exist yet
    #[error("{reason}")]
    Waiting { reason: String, detail: String },

    /// Dependency edges form a cycle
    #[error("Dependency cycle involving {0}")]
    Cycle(SubsystemId),

    /// No controller is registered for the subsystem
    #[error("Subsystem {0} is not enabled")]
    NotEnabled(SubsystemId),
}

impl ControlError {
    pub fn invalid(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn waiting(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Waiting {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ControlError::Store(StoreError::Invalid { .. }) => ErrorClass::Validation,
            ControlError::Store(_) | ControlError::Waiting { .. } => ErrorClass::Transient,
            ControlError::Apply(e) => e.class(),
            ControlError::Invalid { .. } => ErrorClass::Validation,
            ControlError::Cycle(_) | ControlError::NotEnabled(_) => ErrorClass::Fatal,
        }
    }

    /// Reason and detail shown to the user when this error degrades a subsystem
    pub fn degraded_message(&self, context: &str) -> (String, String) {
        match self {
            ControlError::Invalid { reason, detail } | ControlError::Waiting { reason, detail } => {
                (reason.clone(), detail.clone())
            }
            other => (context.to_string(), other.to_string()),
        }
    }
}

/// Result type for control operations
pub type ControlResult<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_types::{ArtifactKey, Kind};

    #[test]
    fn test_error_classes() {
        assert_eq!(
            ControlError::waiting("S3 credential secret does not exist", "").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ControlError::invalid("Syslog config has invalid Endpoint", "bad").class(),
            ErrorClass::Validation
        );
        let key = ArtifactKey::cluster(Kind::Namespace, "ns");
        assert_eq!(
            ControlError::from(ApplyError::DuplicateIdentity(key)).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_degraded_message() {
        let (reason, detail) =
            ControlError::invalid("Both OIDC configuration and Authority cannot be set at the same time", "")
                .degraded_message("Error rendering Manager");
        assert_eq!(reason, "Both OIDC configuration and Authority cannot be set at the same time");
        assert!(detail.is_empty());

        let (reason, detail) = ControlError::Store(StoreError::Unavailable("timeout".into()))
            .degraded_message("Error querying Secret");
        assert_eq!(reason, "Error querying Secret");
        assert!(detail.contains("timeout"));
    }
}
