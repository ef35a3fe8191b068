//! Per-subsystem status manager

use crate::state::{Phase, ReconcileState};
use halyard_apply::Component;
use halyard_types::{SubsystemId, SubsystemStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// State machine for one subsystem, owned by that subsystem's worker
pub struct StatusManager {
    subsystem: SubsystemId,
    phase: Phase,
    backoff: Option<Duration>,
    applied: Option<Vec<Arc<dyn Component>>>,
}

impl StatusManager {
    pub fn new(subsystem: SubsystemId) -> Self {
        Self {
            subsystem,
            phase: Phase::Unknown,
            backoff: None,
            applied: None,
        }
    }

    pub fn subsystem(&self) -> SubsystemId {
        self.subsystem
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Adopt the phase persisted in the store after a restart.
    ///
    /// Only an unobserved manager is restored; applied components are never
    /// restored, so availability is re-established by the next apply.
    pub fn restore(&mut self, status: &SubsystemStatus) {
        if self.phase == Phase::Unknown {
            self.phase = Phase::from_status(status);
        }
    }

    /// Record is absent; forget everything
    pub fn on_record_not_found(&mut self) {
        if self.phase != Phase::NotFound {
            debug!(subsystem = %self.subsystem, "Configuration record not found");
        }
        self.phase = Phase::NotFound;
        self.backoff = None;
        self.applied = None;
    }

    /// Record is present; no-op if it already was
    pub fn on_record_found(&mut self) {
        if !self.phase.is_found() {
            self.phase = Phase::Progressing;
        }
    }

    /// Last write wins; earlier reasons are not kept
    pub fn set_degraded(&mut self, reason: impl Into<String>, detail: impl Into<String>) {
        let reason = reason.into();
        let detail = detail.into();
        info!(subsystem = %self.subsystem, reason = %reason, detail = %detail, "Degraded");
        self.phase = Phase::Degraded { reason, detail };
        self.applied = None;
    }

    pub fn clear_degraded(&mut self) {
        if self.phase.is_degraded() {
            self.phase = Phase::Progressing;
        }
    }

    /// Subsystem switched off and torn down; nothing is applied any more
    pub fn on_disabled(&mut self) {
        if self.phase.is_found() {
            self.phase = Phase::Progressing;
        }
        self.backoff = None;
        self.applied = None;
    }

    /// Remember the components applied this pass for readiness checks
    pub fn mark_applied(&mut self, components: Vec<Arc<dyn Component>>) {
        self.applied = Some(components);
    }

    /// Whether every applied component reports ready, evaluated now
    pub fn is_available(&self) -> bool {
        if !self.phase.is_found() || self.phase.is_degraded() {
            return false;
        }
        match &self.applied {
            Some(components) => components.iter().all(|c| c.ready()),
            None => false,
        }
    }

    /// Move between Progressing and Available to match `is_available`
    pub fn refresh(&mut self) -> bool {
        let available = self.is_available();
        match (&self.phase, available) {
            (Phase::Progressing, true) => {
                info!(subsystem = %self.subsystem, "Available");
                self.phase = Phase::Available;
            }
            (Phase::Available, false) => {
                info!(subsystem = %self.subsystem, "No longer available");
                self.phase = Phase::Progressing;
            }
            _ => {}
        }
        available
    }

    /// Set the delay before the next pass; `None` waits for a trigger
    pub fn schedule(&mut self, backoff: Option<Duration>) {
        self.backoff = backoff;
    }

    pub fn state(&self) -> ReconcileState {
        ReconcileState {
            phase: self.phase.clone(),
            backoff: self.backoff,
        }
    }
}
