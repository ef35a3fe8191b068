//! Halyard Status
//!
//! Tracks where each subsystem stands and how long to wait before the next
//! pass. One [`StatusManager`] is owned by each subsystem's worker; nothing
//! here is shared between workers.
//!
//! ```text
//! Unknown ──► NotFound ◄──────────────────────────┐
//!    │           │ on_record_found                 │ on_record_not_found
//!    └───────────┴──► Progressing ◄─► Degraded ────┤
//!                          │ refresh                │
//!                          ▼                        │
//!                      Available ───────────────────┘
//! ```
//!
//! The persisted form of the state is the record's [`SubsystemStatus`];
//! [`ReconcileState::from_status`] rebuilds it after a restart.
//!
//! [`SubsystemStatus`]: halyard_types::SubsystemStatus

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod backoff;
pub mod manager;
pub mod state;

pub use backoff::{BackoffPolicy, WaitReason};
pub use manager::StatusManager;
pub use state::{Phase, ReconcileState};
