#![forbid(unsafe_code)]

//! Supervision of a Nailgun-hosted program-verification backend.
//!
//! The crate keeps one persistent backend server alive, runs verification
//! requests against it as short-lived client processes, and decodes the
//! counterexample models the backend prints when verification fails.

pub mod config;
pub mod errors;
pub mod model;
pub mod process;
pub mod runtime;
pub mod server;
pub mod session;
pub mod timed;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
