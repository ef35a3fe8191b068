//! Halyard Apply Engine
//!
//! Makes the live store match an ordered sequence of desired artifacts, and
//! removes previously applied artifacts in reverse creation order.
//!
//! ## Guarantees
//!
//! - Applying the same sequence twice with no external mutation issues zero
//!   writes on the second call.
//! - Artifacts are applied strictly in the order given; nothing is reordered.
//! - Only artifacts named in the sequence are touched.
//! - A version conflict is retried once with a fresh read.
//! - A non-transient failure stops the sequence; earlier artifacts stay
//!   applied and the next call resumes from the full sequence.
//! - Teardown deletes in exact reverse order and treats absence as success.
//!
//! ## Merge semantics
//!
//! Updates are a three-way reconciliation between the live payload, the
//! desired payload and the payload the engine last applied (recorded in an
//! annotation). Fields written by other actors survive; fields the engine
//! stopped rendering are removed. The policy is injected per [`Kind`].
//!
//! [`Kind`]: halyard_types::Kind

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod component;
pub mod context;
pub mod engine;
pub mod error;
pub mod merge;

pub use component::{Component, StaticComponent};
pub use context::{PassContext, TriggerCause};
pub use engine::{ApplyEngine, ApplyReport, TeardownReport};
pub use error::{ApplyError, ApplyResult, ErrorClass};
pub use merge::{MergePolicy, MergeRegistry, ReplaceMerge, ThreeWayMerge};
