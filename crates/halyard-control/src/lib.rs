//! Halyard Control - Dependency orchestrator for subsystem reconciliation
//!
//! A pass for one subsystem runs, in order:
//!
//! 1. read the configuration record (absent means nothing to do)
//! 2. tear down and drop the record if its deletion was requested
//! 3. validate the record; tear down if it is disabled
//! 4. preflight gates: API server ready, license valid, installation present
//! 5. upstream subsystems must report `Ready` in their persisted status
//! 6. resolve inputs, render components, apply them in order
//! 7. record availability and write the status back to the record
//!
//! Every wait ends the pass with a fixed retry delay from the
//! [`BackoffPolicy`](halyard_status::BackoffPolicy); nothing loops in-process.
//!
//! ## Dependencies
//!
//! ```text
//! cluster-connection        log-storage
//!                          /           \
//!                 log-collector      manager
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod controller;
pub mod error;
pub mod gates;
pub mod graph;
pub mod installation;
pub mod orchestrator;
pub mod renderer;
pub mod routing;
pub mod subsystems;

pub use controller::{ControlSettings, PassOutcome, SubsystemController};
pub use error::{ControlError, ControlResult};
pub use gates::{GateFailure, Preflight, LICENSE_KEY_NAME};
pub use graph::DependencyGraph;
pub use installation::{
    fill_defaults, installation_key, load_installation, merge_and_fill_defaults, InstallationSpec,
    PlatformNetwork,
};
pub use orchestrator::Orchestrator;
pub use renderer::{RenderContext, Renderer, Resolved};
pub use routing::TriggerRouter;
pub use subsystems::standard_renderers;
