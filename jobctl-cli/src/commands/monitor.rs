//! Job monitoring
//!
//! Tabular job listings, full scheduler records, log tails and a
//! self-refreshing watch view.

use anyhow::Result;
use clap::Parser;
use colored::*;
use jobctl_core::Error;
use jobctl_core::domain::job::{JobDetails, JobHandle};
use jobctl_runtime::Config;
use jobctl_scheduler::{JobQuery, Scheduler, Tool};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::require_tool;

/// Refresh period of the watch view
pub const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Lines shown from the end of each log file
pub const LOG_TAIL_LINES: usize = 50;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

/// Monitor batch jobs
#[derive(Parser, Debug)]
#[command(name = "monitor", version)]
pub struct MonitorArgs {
    /// Show jobs of this user (default: current user)
    #[arg(long)]
    pub user: Option<String>,

    /// Show the full scheduler record of a job
    #[arg(long, value_name = "ID")]
    pub job: Option<String>,

    /// Show the log files of a job
    #[arg(long, value_name = "ID")]
    pub logs: Option<String>,

    /// Refresh the listing every 5 seconds
    #[arg(long)]
    pub watch: bool,

    /// Include jobs that are no longer pending or running
    #[arg(long)]
    pub all: bool,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,

    /// Root of the log tree (default: JOBCTL_LOGS_DIR or ./logs)
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

/// Read-only view of scheduler jobs and their log files
pub struct JobMonitor<S> {
    scheduler: S,
    logs_dir: PathBuf,
}

impl<S: Scheduler> JobMonitor<S> {
    pub fn new(scheduler: S, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            logs_dir: logs_dir.into(),
        }
    }

    /// Jobs of `user`, pending and running only unless `include_completed`
    pub async fn list(&self, user: &str, include_completed: bool) -> jobctl_core::Result<Vec<JobHandle>> {
        let query = if include_completed {
            JobQuery::all_for(user)
        } else {
            JobQuery::active_for(user)
        };
        self.scheduler.list_jobs(&query).await
    }

    /// Full scheduler record of a job
    ///
    /// # Errors
    /// `Error::NotFound` when the scheduler has no record of the job.
    pub async fn details(&self, job_id: &str) -> jobctl_core::Result<JobDetails> {
        self.scheduler
            .job_details(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }

    /// Files under the log tree whose name contains `job_id`
    pub fn find_log_files(&self, job_id: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.logs_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().contains(job_id))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Prints the tail of every log file of a job, returning how many were found
    ///
    /// Finding nothing is reported as a warning, not an error.
    pub fn logs(&self, job_id: &str) -> usize {
        let files = self.find_log_files(job_id);
        if files.is_empty() {
            warn!(
                "No log files for job {} under {}",
                job_id,
                self.logs_dir.display()
            );
            return 0;
        }

        for file in &files {
            println!("{}", format!("==> {} <==", file.display()).bold());
            match fs::read(file) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes);
                    for line in tail_lines(&content, LOG_TAIL_LINES) {
                        println!("{}", line);
                    }
                }
                Err(e) => warn!("Cannot read {}: {}", file.display(), e),
            }
            println!();
        }

        files.len()
    }

    /// Clears the screen and redraws the active jobs of `user` every 5 seconds
    ///
    /// Runs until the process is interrupted.
    pub async fn watch(&self, user: &str) {
        loop {
            print!("{}", CLEAR_SCREEN);
            println!(
                "{}",
                format!(
                    "Jobs of {} (refreshing every {}s, Ctrl-C to stop)",
                    user,
                    WATCH_INTERVAL.as_secs()
                )
                .bold()
            );
            println!();

            match self.list(user, false).await {
                Ok(jobs) => print_jobs(&jobs),
                Err(e) => error!("Failed to query jobs: {}", e),
            }

            tokio::time::sleep(WATCH_INTERVAL).await;
        }
    }
}

/// Entry point of the `monitor` program
pub async fn run<S: Scheduler>(args: MonitorArgs, config: &Config, scheduler: S) -> Result<i32> {
    let user = args.user.clone().unwrap_or_else(|| config.user.clone());
    let logs_dir = args.logs_dir.clone().unwrap_or_else(|| config.logs_dir.clone());
    let monitor = JobMonitor::new(scheduler, logs_dir);

    if let Some(job_id) = &args.logs {
        monitor.logs(job_id);
        return Ok(0);
    }

    if let Some(job_id) = &args.job {
        if !require_tool(&monitor.scheduler, Tool::Control) {
            return Ok(1);
        }
        return match monitor.details(job_id).await {
            Ok(details) => {
                print_details(&details);
                Ok(0)
            }
            Err(e @ Error::NotFound(_)) => {
                error!("{}", e);
                Ok(1)
            }
            Err(e) => Err(e.into()),
        };
    }

    if !require_tool(&monitor.scheduler, Tool::Query) {
        return Ok(1);
    }

    if args.watch {
        info!("Watching jobs of {}", user);
        monitor.watch(&user).await;
        return Ok(0);
    }

    let jobs = monitor.list(&user, args.all).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        print_jobs(&jobs);
    }
    Ok(0)
}

/// Last `count` lines of `content`
pub fn tail_lines(content: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// Fixed-width table of jobs with a header row
pub fn render_table(jobs: &[JobHandle]) -> String {
    let mut rows = vec![row(
        "JOBID",
        "PARTITION",
        "NAME",
        "USER",
        "STATE",
        "TIME",
        "TIME_LIMIT",
        "NODES",
        "REASON",
    )];

    rows.extend(jobs.iter().map(|job| {
        row(
            &job.id,
            &job.partition,
            &job.name,
            &job.user,
            job.state.as_str(),
            &job.elapsed,
            &job.time_limit,
            &job.node_count,
            &job.reason,
        )
    }));

    rows.join("\n")
}

#[allow(clippy::too_many_arguments)]
fn row(
    id: &str,
    partition: &str,
    name: &str,
    user: &str,
    state: &str,
    elapsed: &str,
    limit: &str,
    nodes: &str,
    reason: &str,
) -> String {
    format!(
        "{:<10} {:<10} {:<20} {:<10} {:<11} {:>10} {:>11} {:>5} {}",
        fit(id, 10),
        fit(partition, 10),
        fit(name, 20),
        fit(user, 10),
        fit(state, 11),
        fit(elapsed, 10),
        fit(limit, 11),
        fit(nodes, 5),
        reason
    )
    .trim_end()
    .to_string()
}

fn fit(value: &str, width: usize) -> String {
    value.chars().take(width).collect()
}

fn print_jobs(jobs: &[JobHandle]) {
    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return;
    }
    println!("{}", render_table(jobs));
}

fn print_details(details: &JobDetails) {
    println!("{}", format!("Job {}", details.id).bold());
    println!("{}", "─".repeat(60).dimmed());
    for (key, value) in &details.fields {
        println!("  {} {}", format!("{:<20}", key).cyan(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeScheduler, details, job};
    use jobctl_core::domain::job::JobState;

    fn scheduler() -> FakeScheduler {
        FakeScheduler::new().with_jobs(vec![
            job("101", "train", "alice", JobState::Running, "gpu01"),
            job("102", "eval", "alice", JobState::Pending, ""),
            job("103", "old", "alice", JobState::Completed, "gpu02"),
            job("201", "train", "bob", JobState::Running, "gpu03"),
        ])
    }

    #[tokio::test]
    async fn test_list_defaults_to_active_jobs() {
        let scheduler = scheduler();
        let monitor = JobMonitor::new(scheduler.clone(), "logs");

        let jobs = monitor.list("alice", false).await.unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102"]);
        assert_eq!(
            scheduler.calls(),
            vec![Call::ListJobs(JobQuery::active_for("alice"))]
        );

        let all = monitor.list("alice", true).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_details_of_unknown_job_is_not_found() {
        let scheduler = scheduler().with_details(details("101", &[("JobState", "RUNNING")]));
        let monitor = JobMonitor::new(scheduler, "logs");

        assert_eq!(monitor.details("101").await.unwrap().state(), JobState::Running);
        assert!(matches!(
            monitor.details("999").await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_find_log_files_searches_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let job_dir = dir.path().join("jobs").join("train");
        fs::create_dir_all(&job_dir).unwrap();
        fs::write(job_dir.join("job_101_20250101_120000.log"), "a\nb\n").unwrap();
        fs::write(job_dir.join("job_101_20250101_120000.err"), "").unwrap();
        fs::write(job_dir.join("job_202_20250101_120000.log"), "").unwrap();

        let monitor = JobMonitor::new(FakeScheduler::new(), dir.path());
        let files = monitor.find_log_files("101");

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.to_string_lossy().contains("101")));
        assert_eq!(monitor.logs("101"), 2);
    }

    #[test]
    fn test_logs_without_matches_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = JobMonitor::new(FakeScheduler::new(), dir.path().join("missing"));
        assert_eq!(monitor.logs("101"), 0);
    }

    #[test]
    fn test_tail_lines() {
        let content: String = (1..=60).map(|i| format!("line {}\n", i)).collect();
        let tail = tail_lines(&content, LOG_TAIL_LINES);
        assert_eq!(tail.len(), 50);
        assert_eq!(tail[0], "line 11");
        assert_eq!(tail[49], "line 60");

        assert_eq!(tail_lines("one\ntwo", 50), vec!["one", "two"]);
    }

    #[test]
    fn test_render_table() {
        let jobs = vec![
            job("101", "a_rather_long_training_job_name", "alice", JobState::Running, "gpu01"),
            job("102", "eval", "alice", JobState::Pending, ""),
        ];
        let table = render_table(&jobs);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("JOBID      PARTITION  NAME"));
        assert!(lines[0].ends_with("REASON"));
        assert!(lines[1].contains("a_rather_long_traini "));
        assert!(lines[1].contains("RUNNING"));
        assert!(lines[2].ends_with("(Priority)"));

        let state_column = lines[0].find("STATE").unwrap();
        assert_eq!(lines[2].find("PENDING"), Some(state_column));
    }

    #[tokio::test]
    async fn test_run_fails_without_query_client() {
        let config = Config::default();
        let args = MonitorArgs::try_parse_from(["monitor", "--user", "alice"]).unwrap();
        let scheduler = scheduler().without_tool(Tool::Query);

        assert_eq!(run(args, &config, scheduler.clone()).await.unwrap(), 1);
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_lists_jobs() {
        let config = Config::default();
        let args = MonitorArgs::try_parse_from(["monitor", "--user", "alice", "--all"]).unwrap();
        let scheduler = scheduler();

        assert_eq!(run(args, &config, scheduler.clone()).await.unwrap(), 0);
        assert_eq!(
            scheduler.calls(),
            vec![Call::ListJobs(JobQuery::all_for("alice"))]
        );
    }
}
