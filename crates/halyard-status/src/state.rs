//! Reconcile state and its persisted form

use halyard_types::{StatusState, SubsystemStatus};
use std::fmt;
use std::time::Duration;

/// Where a subsystem stands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// No pass has run yet
    #[default]
    Unknown,
    /// Configuration record absent
    NotFound,
    /// Record found, not yet available
    Progressing,
    /// Record found, not meeting its desired state
    Degraded { reason: String, detail: String },
    /// All artifacts applied and ready
    Available,
}

impl Phase {
    pub fn is_found(&self) -> bool {
        !matches!(self, Phase::Unknown | Phase::NotFound)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Phase::Degraded { .. })
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Phase::Available)
    }

    /// Rebuild a phase from the status persisted in a record.
    ///
    /// A record with an empty status has been seen but not yet reconciled.
    pub fn from_status(status: &SubsystemStatus) -> Self {
        match status.state {
            StatusState::Empty | StatusState::Progressing => Phase::Progressing,
            StatusState::Ready => Phase::Available,
            StatusState::Degraded => Phase::Degraded {
                reason: status.reason.clone().unwrap_or_default(),
                detail: status.detail.clone().unwrap_or_default(),
            },
        }
    }

    /// Persisted form; `None` when there is no record to write to
    pub fn to_status(&self, observed_version: u64) -> Option<SubsystemStatus> {
        match self {
            Phase::Unknown | Phase::NotFound => None,
            Phase::Progressing => Some(SubsystemStatus {
                state: StatusState::Progressing,
                reason: None,
                detail: None,
                observed_version,
            }),
            Phase::Degraded { reason, detail } => Some(SubsystemStatus::degraded(
                reason.clone(),
                detail.clone(),
                observed_version,
            )),
            Phase::Available => Some(SubsystemStatus::ready(observed_version)),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unknown => f.write_str("Unknown"),
            Phase::NotFound => f.write_str("NotFound"),
            Phase::Progressing => f.write_str("Progressing"),
            Phase::Degraded { reason, detail } if detail.is_empty() => {
                write!(f, "Degraded({})", reason)
            }
            Phase::Degraded { reason, detail } => write!(f, "Degraded({}: {})", reason, detail),
            Phase::Available => f.write_str("Available"),
        }
    }
}

/// Snapshot of a subsystem's state plus the retry it asked for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileState {
    pub phase: Phase,
    pub backoff: Option<Duration>,
}

impl ReconcileState {
    pub fn from_status(status: &SubsystemStatus) -> Self {
        Self {
            phase: Phase::from_status(status),
            backoff: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.phase.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_survives_persistence() {
        let phases = [
            Phase::Progressing,
            Phase::Available,
            Phase::Degraded {
                reason: "waiting on log-storage".into(),
                detail: String::new(),
            },
            Phase::Degraded {
                reason: "Error querying Secret".into(),
                detail: "store unavailable".into(),
            },
        ];

        for phase in phases {
            let status = phase.to_status(7).unwrap();
            assert_eq!(status.observed_version, 7);
            assert_eq!(Phase::from_status(&status), phase);
        }
    }

    #[test]
    fn test_absent_record_has_no_status() {
        assert!(Phase::NotFound.to_status(1).is_none());
        assert!(Phase::Unknown.to_status(1).is_none());
    }

    #[test]
    fn test_empty_status_rebuilds_as_progressing() {
        let state = ReconcileState::from_status(&SubsystemStatus::default());
        assert_eq!(state.phase, Phase::Progressing);
        assert!(!state.is_available());
    }
}
