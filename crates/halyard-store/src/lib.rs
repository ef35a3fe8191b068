//! Halyard Store
//!
//! The orchestrator is expressed purely in terms of the [`Store`] trait: a
//! get/create/update/delete-by-identity store with version-tagged writes.
//! Watch, cache and queue machinery live outside this crate.
//!
//! [`InMemoryStore`] implements the trait for development and tests. It
//! records every call, can inject conflicts and failures, and broadcasts a
//! [`StoreEvent`] for every committed write so triggers can be routed.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{ChangeKind, Fault, InMemoryStore, StoreCall, StoreEvent, StoreOp};
pub use traits::{Store, StoreExt};
