//! Halyard Types - Core types for subsystem orchestration
//!
//! Halyard drives a cluster's live state toward the desired state described
//! by a set of configuration records. Each logical subsystem (connectivity
//! gateway, log collection, log storage, management UI) owns one record and
//! the artifacts rendered from it.
//!
//! ## Key Concepts
//!
//! - **ArtifactKey**: exact-match identity `(kind, namespace, name)`
//! - **Artifact**: an identity plus an opaque JSON payload
//! - **ConfigRecord**: typed view over the artifact that configures a subsystem
//! - **SubsystemStatus**: the status sub-record persisted after every pass
//! - **SubsystemId**: the closed set of orchestrated subsystems

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifact;
pub mod ids;
pub mod platform;
pub mod record;

pub use artifact::{Artifact, LAST_APPLIED_ANNOTATION};
pub use ids::{ArtifactKey, Kind, OwnerReference, SubsystemId, UnknownSubsystem};
pub use platform::Provider;
pub use record::{ConfigRecord, StatusState, SubsystemStatus, DEFAULT_RECORD_NAME};
