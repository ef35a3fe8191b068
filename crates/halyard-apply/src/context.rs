//! Per-pass context handed to every core operation
//!
//! There is no process-wide logger or state. A pass creates one context,
//! and everything it calls logs under that context's span.

use halyard_types::{ArtifactKey, SubsystemId};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::Span;
use uuid::Uuid;

/// Why a reconciliation pass started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCause {
    /// The subsystem's own configuration record changed
    RecordChanged,
    /// A watched input (secret, config map, upstream record) changed
    DependencyChanged(ArtifactKey),
    /// A previously scheduled delayed retry fired
    Retry,
    /// Periodic resync
    Resync,
    /// Explicit request (startup, tests)
    Manual,
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerCause::RecordChanged => f.write_str("record-changed"),
            TriggerCause::DependencyChanged(key) => write!(f, "dependency-changed:{}", key),
            TriggerCause::Retry => f.write_str("retry"),
            TriggerCause::Resync => f.write_str("resync"),
            TriggerCause::Manual => f.write_str("manual"),
        }
    }
}

/// Context for one reconciliation pass of one subsystem
#[derive(Debug, Clone)]
pub struct PassContext {
    /// Subsystem being reconciled
    pub subsystem: SubsystemId,
    /// Unique pass ID for tracing
    pub pass_id: Uuid,
    /// What triggered the pass
    pub cause: TriggerCause,
    started: Instant,
    span: Span,
}

impl PassContext {
    pub fn new(subsystem: SubsystemId, cause: TriggerCause) -> Self {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "reconcile_pass",
            subsystem = %subsystem,
            pass_id = %pass_id,
            cause = %cause,
        );
        Self {
            subsystem,
            pass_id,
            cause,
            started: Instant::now(),
            span,
        }
    }

    /// Span every operation of this pass is recorded under
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_types::Kind;

    #[test]
    fn test_each_pass_gets_its_own_id() {
        let a = PassContext::new(SubsystemId::Manager, TriggerCause::Manual);
        let b = PassContext::new(SubsystemId::Manager, TriggerCause::Manual);
        assert_ne!(a.pass_id, b.pass_id);
    }

    #[test]
    fn test_cause_display() {
        let key = ArtifactKey::namespaced(Kind::Secret, "tigera-operator", "tigera-managed-cluster-connection");
        assert_eq!(
            TriggerCause::DependencyChanged(key).to_string(),
            "dependency-changed:Secret/tigera-operator/tigera-managed-cluster-connection"
        );
        assert_eq!(TriggerCause::Retry.to_string(), "retry");
    }
}
