//! jobctl Scheduler Client
//!
//! Access to the external batch scheduler through its command-line client,
//! plus the HTTP health probe used for service jobs.
//!
//! The scheduler is treated as an opaque service. Every operation here is a
//! single invocation of one of its client programs with a structured argument
//! list; nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use jobctl_scheduler::{JobQuery, Result, Scheduler, SlurmScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scheduler = SlurmScheduler::new();
//!     let jobs = scheduler.list_jobs(&JobQuery::active_for("alice")).await?;
//!     println!("{} active job(s)", jobs.len());
//!     Ok(())
//! }
//! ```

pub mod parse;
mod probe;
mod slurm;

pub use jobctl_core::{Error, Result};
pub use probe::{HealthProbe, ProbeOutcome};
pub use slurm::{SlurmPrograms, SlurmScheduler};

use async_trait::async_trait;
use jobctl_core::domain::job::{JobDetails, JobHandle, JobState};
use std::path::Path;

/// Client programs of the scheduler, checked before use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Submit,
    Query,
    Control,
    Cancel,
}

/// Filter for a job listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    /// Restrict to this user's jobs
    pub user: Option<String>,
    /// Restrict to these states; `None` asks for every state the scheduler still tracks
    pub states: Option<Vec<JobState>>,
    /// Restrict to jobs with exactly this name
    pub name: Option<String>,
}

impl JobQuery {
    /// Pending and running jobs of a user
    pub fn active_for(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            states: Some(vec![JobState::Pending, JobState::Running]),
            name: None,
        }
    }

    /// Every job of a user the scheduler still knows about
    pub fn all_for(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            states: None,
            name: None,
        }
    }

    /// Restrict the query to one job name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict the query to the given states
    pub fn in_states(mut self, states: Vec<JobState>) -> Self {
        self.states = Some(states);
        self
    }
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Job id assigned by the scheduler, when its reply carried one
    pub job_id: Option<String>,
    /// Raw reply of the submit command
    pub message: String,
}

/// Operations jobctl requests from the batch scheduler
///
/// Implementations never retry. A failed call is reported once and left to
/// the operator.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Fails with `Error::Environment` when the client program for `tool` is absent
    fn ensure_available(&self, tool: Tool) -> Result<()>;

    /// Hands a descriptor file to the scheduler's submit command
    async fn submit(&self, descriptor: &Path) -> Result<Submission>;

    /// Lists jobs matching the query, in the scheduler's own order
    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobHandle>>;

    /// Full record of one job, `None` when the scheduler has no such job
    async fn job_details(&self, job_id: &str) -> Result<Option<JobDetails>>;

    /// Requests termination of one job
    async fn cancel(&self, job_id: &str) -> Result<()>;

    /// Requests termination of every job owned by `user` in one call
    async fn cancel_user_jobs(&self, user: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builders() {
        let query = JobQuery::active_for("alice").named("vllm_server");
        assert_eq!(query.user.as_deref(), Some("alice"));
        assert_eq!(
            query.states,
            Some(vec![JobState::Pending, JobState::Running])
        );
        assert_eq!(query.name.as_deref(), Some("vllm_server"));

        let all = JobQuery::all_for("bob").in_states(vec![JobState::Running]);
        assert_eq!(all.states, Some(vec![JobState::Running]));
        assert_eq!(JobQuery::all_for("bob").states, None);
    }
}
