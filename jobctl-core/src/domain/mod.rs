//! Core domain types
//!
//! These types describe what the tools read (job descriptors), what they
//! observe from the scheduler (jobs and their records) and what they derive
//! (service endpoints). None of them is persisted by jobctl itself.

pub mod descriptor;
pub mod endpoint;
pub mod job;
pub mod log;
