//! Job submission
//!
//! Resolves a job name to its descriptor in the store, shows the resource
//! directives and hands the file to the scheduler.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::*;
use jobctl_core::Error;
use jobctl_core::domain::descriptor::{DescriptorStore, JobDescriptor};
use jobctl_scheduler::{Scheduler, Submission, Tool};
use std::path::PathBuf;
use tracing::{error, info};

/// Submit a job descriptor to the batch scheduler
#[derive(Parser, Debug)]
#[command(name = "submit", version)]
pub struct SubmitArgs {
    /// Job name (descriptor file name without `.sbatch`)
    pub job_name: Option<String>,

    /// Show the submit command without running it
    #[arg(long)]
    pub dry_run: bool,

    /// List available jobs
    #[arg(long)]
    pub list: bool,

    /// Directory holding the job descriptors
    #[arg(long, env = "JOBCTL_JOBS_DIR", default_value = "jobs")]
    pub jobs_dir: PathBuf,
}

/// What a submit request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was sent; the equivalent command line
    DryRun { command: String },
    /// The scheduler accepted the descriptor
    Submitted(Submission),
}

/// Submits descriptors from a store
pub struct JobSubmitter<S> {
    store: DescriptorStore,
    scheduler: S,
}

impl<S: Scheduler> JobSubmitter<S> {
    pub fn new(store: DescriptorStore, scheduler: S) -> Self {
        Self { store, scheduler }
    }

    /// Names of the available descriptors, in directory order
    pub fn list(&self) -> jobctl_core::Result<Vec<String>> {
        self.store.list()
    }

    /// Submits `job_name`, or only describes the submission when `dry_run`
    ///
    /// # Errors
    /// `Error::NotFound` when the store has no such descriptor; the
    /// scheduler is not contacted in that case.
    pub async fn submit(&self, job_name: &str, dry_run: bool) -> jobctl_core::Result<SubmitOutcome> {
        let descriptor = self.store.find(job_name)?;
        print_descriptor(&descriptor);

        if dry_run {
            let command = format!("sbatch {}", descriptor.file_path.display());
            info!("Dry run, not submitting");
            return Ok(SubmitOutcome::DryRun { command });
        }

        self.scheduler.ensure_available(Tool::Submit)?;
        info!("Submitting {}", descriptor.file_path.display());
        let submission = self.scheduler.submit(&descriptor.file_path).await?;
        Ok(SubmitOutcome::Submitted(submission))
    }
}

/// Entry point of the `submit` program
pub async fn run<S: Scheduler>(args: SubmitArgs, scheduler: S) -> Result<i32> {
    let submitter = JobSubmitter::new(DescriptorStore::new(&args.jobs_dir), scheduler);

    if args.list {
        let names = submitter.list()?;
        print_job_list(&names, &args.jobs_dir);
        return Ok(0);
    }

    let Some(job_name) = args.job_name.as_deref() else {
        eprintln!("{}", SubmitArgs::command().render_usage());
        if let Ok(names) = submitter.list() {
            print_job_list(&names, &args.jobs_dir);
        }
        return Ok(1);
    };

    match submitter.submit(job_name, args.dry_run).await {
        Ok(SubmitOutcome::DryRun { command }) => {
            println!("{}", "Dry run, would execute:".yellow());
            println!("  {}", command);
            Ok(0)
        }
        Ok(SubmitOutcome::Submitted(submission)) => {
            match &submission.job_id {
                Some(id) => println!("{} Submitted job {}", "✓".green(), id.bold()),
                None => println!("{} {}", "✓".green(), submission.message),
            }
            Ok(0)
        }
        Err(Error::NotFound(what)) => {
            error!("Job not found: {}", what);
            if let Ok(names) = submitter.list() {
                print_job_list(&names, &args.jobs_dir);
            }
            Ok(1)
        }
        Err(e) => {
            error!("Submission of {} failed: {}", job_name, e);
            Ok(1)
        }
    }
}

fn print_descriptor(descriptor: &JobDescriptor) {
    println!(
        "{} {} ({})",
        "Job:".bold(),
        descriptor.name.cyan(),
        descriptor.file_path.display().to_string().dimmed()
    );

    if descriptor.directives.is_empty() {
        println!("  {}", "no scheduler directives".dimmed());
        return;
    }

    for directive in &descriptor.directives {
        if directive.value.is_empty() {
            println!("  {}", directive.key);
        } else {
            println!("  {:<16} {}", directive.key, directive.value);
        }
    }
}

fn print_job_list(names: &[String], dir: &std::path::Path) {
    if names.is_empty() {
        println!(
            "{}",
            format!("No jobs found in {}", dir.display()).yellow()
        );
        return;
    }

    println!("{}", format!("Available jobs ({}):", names.len()).bold());
    for name in names {
        println!("  {} {}", "▸".cyan(), name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeScheduler};
    use std::fs;

    const DESCRIPTOR: &str = "#!/bin/bash\n#SBATCH --job-name=train\n#SBATCH --time=01:00:00\n\necho hi\n";

    fn store_with(names: &[&str]) -> (tempfile::TempDir, DescriptorStore) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(format!("{}.sbatch", name)), DESCRIPTOR).unwrap();
        }
        let store = DescriptorStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_not_found_without_scheduler_call() {
        let (_dir, store) = store_with(&["train"]);
        let scheduler = FakeScheduler::new();
        let submitter = JobSubmitter::new(store, scheduler.clone());

        let result = submitter.submit("nonexistent_job", false).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let (dir, store) = store_with(&["train"]);
        let scheduler = FakeScheduler::new();
        let submitter = JobSubmitter::new(store, scheduler.clone());

        let outcome = submitter.submit("train", true).await.unwrap();

        let expected = format!("sbatch {}", dir.path().join("train.sbatch").display());
        assert_eq!(outcome, SubmitOutcome::DryRun { command: expected });
        assert_eq!(scheduler.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_hands_descriptor_to_scheduler() {
        let (dir, store) = store_with(&["train"]);
        let scheduler = FakeScheduler::new();
        let submitter = JobSubmitter::new(store, scheduler.clone());

        let outcome = submitter.submit("train", false).await.unwrap();

        match outcome {
            SubmitOutcome::Submitted(submission) => {
                assert_eq!(submission.job_id.as_deref(), Some("4242"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            scheduler.calls(),
            vec![Call::Submit(dir.path().join("train.sbatch"))]
        );
    }

    #[tokio::test]
    async fn test_submit_fails_when_client_missing() {
        let (_dir, store) = store_with(&["train"]);
        let scheduler = FakeScheduler::new().without_tool(Tool::Submit);
        let submitter = JobSubmitter::new(store, scheduler.clone());

        let result = submitter.submit("train", false).await;

        assert!(matches!(result, Err(Error::Environment(_))));
        assert_eq!(scheduler.submit_calls(), 0);
    }

    #[test]
    fn test_list_returns_descriptor_names() {
        let (dir, store) = store_with(&["a", "b"]);
        fs::write(dir.path().join("notes.txt"), "not a job").unwrap();
        let submitter = JobSubmitter::new(store, FakeScheduler::new());

        let mut names = submitter.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_run_exit_codes() {
        let (dir, _store) = store_with(&["train"]);
        let args = |extra: &[&str]| {
            let mut argv = vec!["submit", "--jobs-dir", dir.path().to_str().unwrap()];
            argv.extend_from_slice(extra);
            SubmitArgs::try_parse_from(argv).unwrap()
        };

        assert_eq!(run(args(&["--list"]), FakeScheduler::new()).await.unwrap(), 0);
        assert_eq!(run(args(&["train", "--dry-run"]), FakeScheduler::new()).await.unwrap(), 0);
        assert_eq!(run(args(&["missing"]), FakeScheduler::new()).await.unwrap(), 1);
        assert_eq!(run(args(&[]), FakeScheduler::new()).await.unwrap(), 1);
    }
}
