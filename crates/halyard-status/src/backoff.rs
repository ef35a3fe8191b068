//! Fixed-interval retry backoff
//!
//! Intervals are literal, never exponential. Every wait path hands control
//! back to the worker with one of these delays instead of looping in-process.

use halyard_apply::ErrorClass;
use std::fmt;
use std::time::Duration;

/// Soft conditions that end a pass with a delayed retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitReason {
    /// An upstream subsystem, the API server, or a resolved input is not ready
    Upstream,
    /// License or authorization gate
    License,
    /// Artifacts applied but not yet ready
    Availability,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReason::Upstream => f.write_str("upstream"),
            WaitReason::License => f.write_str("license"),
            WaitReason::Availability => f.write_str("availability"),
        }
    }
}

/// Retry delays per condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub upstream_wait: Duration,
    pub license_wait: Duration,
    pub availability_wait: Duration,
    pub transient_wait: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            upstream_wait: Duration::from_secs(5),
            license_wait: Duration::from_secs(10),
            availability_wait: Duration::from_secs(30),
            transient_wait: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn for_wait(&self, reason: WaitReason) -> Duration {
        match reason {
            WaitReason::Upstream => self.upstream_wait,
            WaitReason::License => self.license_wait,
            WaitReason::Availability => self.availability_wait,
        }
    }

    /// Delay after an error of the given class.
    ///
    /// Validation errors wait for the user to edit the record, and fatal
    /// errors are never retried, so neither schedules a retry.
    pub fn for_class(&self, class: ErrorClass) -> Option<Duration> {
        match class {
            ErrorClass::Transient => Some(self.transient_wait),
            ErrorClass::Validation | ErrorClass::Fatal => None,
        }
    }
}
