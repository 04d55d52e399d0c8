//! Job cancellation
//!
//! Cancels jobs by id, by exact name or all of the current user's jobs.
//! Unless forced, every request is confirmed first; declining is a normal
//! outcome, not an error.

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use colored::*;
use jobctl_runtime::Config;
use jobctl_scheduler::{JobQuery, Scheduler, Tool};
use std::fmt;
use tracing::{error, info, warn};

use super::require_tool;
use crate::prompt::Prompter;

/// Cancel batch jobs
#[derive(Parser, Debug)]
#[command(name = "cancel", version)]
pub struct CancelArgs {
    /// Ids of the jobs to cancel
    pub job_ids: Vec<String>,

    /// Cancel every job of the current user
    #[arg(long)]
    pub all: bool,

    /// Cancel every job of the current user with this exact name
    #[arg(long)]
    pub name: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,

    /// Act on this user's jobs (default: current user)
    #[arg(long)]
    pub user: Option<String>,
}

impl CancelArgs {
    fn has_target(&self) -> bool {
        !self.job_ids.is_empty() || self.all || self.name.is_some()
    }
}

/// Result of one cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cancellation was requested for this many jobs
    Cancelled(usize),
    /// The operator declined the confirmation
    Declined,
    /// No job matched
    NothingToCancel,
}

impl fmt::Display for CancelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled(1) => write!(f, "cancelled 1 job"),
            Self::Cancelled(n) => write!(f, "cancelled {} jobs", n),
            Self::Declined => write!(f, "cancellation declined"),
            Self::NothingToCancel => write!(f, "nothing to cancel"),
        }
    }
}

/// Resolves and cancels jobs of one user
pub struct JobCanceller<S, P> {
    scheduler: S,
    prompter: P,
    user: String,
}

impl<S: Scheduler, P: Prompter> JobCanceller<S, P> {
    pub fn new(scheduler: S, prompter: P, user: impl Into<String>) -> Self {
        Self {
            scheduler,
            prompter,
            user: user.into(),
        }
    }

    fn confirmed(&self, force: bool, question: &str) -> bool {
        if force || self.prompter.confirm(question) {
            return true;
        }
        info!("Cancellation declined");
        false
    }

    /// Cancels one job by id
    pub async fn cancel_one(&self, job_id: &str, force: bool) -> jobctl_core::Result<CancelOutcome> {
        if !self.confirmed(force, &format!("Cancel job {}?", job_id)) {
            return Ok(CancelOutcome::Declined);
        }

        match self.scheduler.cancel(job_id).await {
            Ok(()) => {
                info!("Cancelled job {}", job_id);
                Ok(CancelOutcome::Cancelled(1))
            }
            Err(e) => {
                error!("Failed to cancel job {}: {}", job_id, e);
                Err(e)
            }
        }
    }

    /// Cancels every live job of the user named exactly `name`
    ///
    /// Finished jobs still listed by the scheduler are skipped. Confirms once for the whole batch. Every resolved id is attempted;
    /// the first failure is returned after the rest have been tried.
    pub async fn cancel_by_name(&self, name: &str, force: bool) -> jobctl_core::Result<CancelOutcome> {
        let jobs = self
            .scheduler
            .list_jobs(&JobQuery::all_for(&self.user).named(name))
            .await?;
        let ids: Vec<&str> = jobs
            .iter()
            .filter(|job| job.name == name && job.state.is_active())
            .map(|job| job.id.as_str())
            .collect();

        if ids.is_empty() {
            warn!("No jobs named '{}' for user {}", name, self.user);
            return Ok(CancelOutcome::NothingToCancel);
        }

        let question = format!(
            "Cancel {} job(s) named '{}' ({})?",
            ids.len(),
            name,
            ids.join(", ")
        );
        if !self.confirmed(force, &question) {
            return Ok(CancelOutcome::Declined);
        }

        let mut cancelled = 0;
        let mut first_error = None;
        for id in ids {
            match self.scheduler.cancel(id).await {
                Ok(()) => {
                    info!("Cancelled job {}", id);
                    cancelled += 1;
                }
                Err(e) => {
                    error!("Failed to cancel job {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(CancelOutcome::Cancelled(cancelled)),
        }
    }

    /// Cancels every live job of the user with one bulk request
    pub async fn cancel_all(&self, force: bool) -> jobctl_core::Result<CancelOutcome> {
        let jobs = self
            .scheduler
            .list_jobs(&JobQuery::all_for(&self.user))
            .await?;
        let live = jobs.iter().filter(|job| job.state.is_active()).count();

        if live == 0 {
            warn!("No jobs to cancel for user {}", self.user);
            return Ok(CancelOutcome::NothingToCancel);
        }

        let question = format!(
            "Cancel ALL {} job(s) of user {}? This cannot be undone.",
            live,
            self.user
        );
        if !self.confirmed(force, &question) {
            return Ok(CancelOutcome::Declined);
        }

        match self.scheduler.cancel_user_jobs(&self.user).await {
            Ok(()) => {
                info!("Cancelled all jobs of {}", self.user);
                Ok(CancelOutcome::Cancelled(live))
            }
            Err(e) => {
                error!("Failed to cancel jobs of {}: {}", self.user, e);
                Err(e)
            }
        }
    }
}

/// Entry point of the `cancel` program
pub async fn run<S: Scheduler, P: Prompter>(
    args: CancelArgs,
    config: &Config,
    scheduler: S,
    prompter: P,
) -> Result<i32> {
    if !args.has_target() {
        eprintln!("{}", CancelArgs::command().render_usage());
        eprintln!("Give at least one job id, --name NAME or --all");
        return Ok(1);
    }

    if !require_tool(&scheduler, Tool::Cancel) {
        return Ok(1);
    }
    if (args.all || args.name.is_some()) && !require_tool(&scheduler, Tool::Query) {
        return Ok(1);
    }

    let user = args.user.clone().unwrap_or_else(|| config.user.clone());
    if user.is_empty() {
        bail!("cannot determine the current user; set USER or pass --user");
    }

    let canceller = JobCanceller::new(scheduler, prompter, user);
    let mut failed = false;

    if args.all {
        failed |= !report(canceller.cancel_all(args.force).await);
    }
    if let Some(name) = &args.name {
        failed |= !report(canceller.cancel_by_name(name, args.force).await);
    }
    for job_id in &args.job_ids {
        failed |= !report(canceller.cancel_one(job_id, args.force).await);
    }

    Ok(if failed { 1 } else { 0 })
}

fn report(result: jobctl_core::Result<CancelOutcome>) -> bool {
    match result {
        Ok(outcome @ CancelOutcome::Cancelled(_)) => {
            println!("{} {}", "✓".green(), outcome);
            true
        }
        Ok(outcome) => {
            println!("{}", outcome.to_string().yellow());
            true
        }
        Err(_) => false,
    }
}
