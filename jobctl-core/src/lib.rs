//! jobctl Core
//!
//! Core types and abstractions shared by the jobctl tools.
//!
//! This crate contains:
//! - Domain types: job descriptors, observed scheduler jobs, log levels, service endpoints
//! - Error taxonomy used by every component
//! - Executable lookup used by availability checks

pub mod domain;
pub mod error;
pub mod executable;

pub use error::{Error, Result};
