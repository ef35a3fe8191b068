//! Halyard Daemon library
//!
//! Runs one worker per enabled subsystem against an in-memory object store:
//! - configuration from defaults, file, and `HALYARD_*` environment
//! - optional store seeding from a JSON file
//! - store change events routed to the workers that watch them
//! - delayed retries and periodic resync per worker

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod seed;
pub mod server;
pub mod triggers;
pub mod worker;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use server::Daemon;
pub use worker::{Worker, WorkerHandle};
