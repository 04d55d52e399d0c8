//! Service job inspection
//!
//! Finds the running service job, reports its placement and PID marker,
//! and probes its HTTP health endpoint.

use anyhow::Result;
use clap::Parser;
use colored::*;
use jobctl_core::Error;
use jobctl_core::domain::endpoint::ServiceEndpoint;
use jobctl_core::domain::job::{JobHandle, JobState};
use jobctl_runtime::Config;
use jobctl_scheduler::{HealthProbe, JobQuery, ProbeOutcome, Scheduler, Tool};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

use super::require_tool;

/// Default service job name
pub const DEFAULT_SERVICE_NAME: &str = "vllm_server";

/// Default service port
pub const DEFAULT_SERVICE_PORT: u16 = 8000;

/// PID markers older than this are ignored by the fallback search
pub const PID_FILE_MAX_AGE: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Show placement and health of a running service job
#[derive(Parser, Debug)]
#[command(name = "service-info", version)]
pub struct ServiceArgs {
    /// Job id of the service (default: first running job with the service name)
    pub job_id: Option<String>,

    /// Probe the service health endpoint
    #[arg(long)]
    pub test: bool,

    /// Port the service listens on
    #[arg(long, env = "JOBCTL_SERVICE_PORT", default_value_t = DEFAULT_SERVICE_PORT)]
    pub port: u16,

    /// Job name of the service
    #[arg(long, env = "JOBCTL_SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub name: String,

    /// Probe this base URL instead of the job's node
    #[arg(long, env = "INFERENCE_BASE_URL")]
    pub base_url: Option<String>,

    /// Look for jobs of this user (default: current user)
    #[arg(long)]
    pub user: Option<String>,

    /// Root of the log tree (default: JOBCTL_LOGS_DIR or ./logs)
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

/// Placement and PID marker of a service job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub job_id: String,
    pub state: JobState,
    pub node: Option<String>,
    pub partition: Option<String>,
    pub pid_file: Option<PathBuf>,
    pub pid: Option<u32>,
}

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub base_url: String,
    pub outcome: ProbeOutcome,
    pub version: Option<String>,
}

/// Inspects one kind of long-running service job
pub struct ServiceInfoProbe<S> {
    scheduler: S,
    health: HealthProbe,
    service_name: String,
    user: String,
    logs_dir: PathBuf,
}

impl<S: Scheduler> ServiceInfoProbe<S> {
    pub fn new(
        scheduler: S,
        service_name: impl Into<String>,
        user: impl Into<String>,
        logs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scheduler,
            health: HealthProbe::new(),
            service_name: service_name.into(),
            user: user.into(),
            logs_dir: logs_dir.into(),
        }
    }

    /// Uses a custom health probe
    pub fn with_health_probe(mut self, health: HealthProbe) -> Self {
        self.health = health;
        self
    }

    /// Log directory the service job writes its PID marker to
    pub fn service_log_dir(&self) -> PathBuf {
        self.logs_dir.join("jobs").join(&self.service_name)
    }

    /// First running service job of the user, in scheduler order
    ///
    /// # Errors
    /// `Error::NotFound` when no such job is running.
    pub async fn discover(&self) -> jobctl_core::Result<JobHandle> {
        let query = JobQuery::all_for(&self.user)
            .named(&self.service_name)
            .in_states(vec![JobState::Running]);

        self.scheduler
            .list_jobs(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no running '{}' job for user {}",
                    self.service_name, self.user
                ))
            })
    }

    /// Placement, state and PID marker of a job
    pub async fn info(&self, job_id: &str) -> jobctl_core::Result<ServiceInfo> {
        let details = self
            .scheduler
            .job_details(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        let pid_file = find_pid_file(
            &self.service_log_dir(),
            &self.service_name,
            job_id,
            SystemTime::now(),
        );
        let pid = pid_file.as_deref().and_then(read_pid);

        Ok(ServiceInfo {
            job_id: job_id.to_string(),
            state: details.state(),
            node: details.node().map(str::to_string),
            partition: details.partition().map(str::to_string),
            pid_file,
            pid,
        })
    }

    /// Probes the service of a job on `port`, or at `base_url` when given
    ///
    /// An unreachable service is reported in the outcome, not as an error.
    pub async fn probe(
        &self,
        job_id: &str,
        port: u16,
        base_url: Option<&str>,
    ) -> jobctl_core::Result<ProbeReport> {
        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let details = self
                    .scheduler
                    .job_details(job_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
                let node = details.node().ok_or_else(|| {
                    Error::NotFound(format!("job {} has no assigned node", job_id))
                })?;
                ServiceEndpoint::from_node_list(node, port).base_url()
            }
        };

        info!("Probing {}", base_url);
        let outcome = self.health.check(&base_url).await;
        let version = if outcome.is_healthy() {
            self.health.version(&base_url).await
        } else {
            None
        };

        Ok(ProbeReport {
            base_url,
            outcome,
            version,
        })
    }
}

/// PID marker of a service job
///
/// `<service>_<job_id>.pid` wins when present. Otherwise the newest `*.pid`
/// file in `dir` modified within [`PID_FILE_MAX_AGE`] of `now` is used; it
/// may belong to another run of the same service.
pub fn find_pid_file(dir: &Path, service: &str, job_id: &str, now: SystemTime) -> Option<PathBuf> {
    let keyed = dir.join(format!("{}_{}.pid", service, job_id));
    if keyed.is_file() {
        return Some(keyed);
    }

    let cutoff = now.checked_sub(PID_FILE_MAX_AGE)?;
    let newest = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "pid"))
        .filter_map(|path| {
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            (modified >= cutoff).then_some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path);

    if let Some(path) = &newest {
        debug!("Using recent PID file {}", path.display());
    }
    newest
}

fn read_pid(path: &Path) -> Option<u32> {
    match fs::read_to_string(path) {
        Ok(content) => content.trim().parse().ok(),
        Err(e) => {
            warn!("Cannot read PID file {}: {}", path.display(), e);
            None
        }
    }
}

/// Entry point of the `service-info` program
pub async fn run<S: Scheduler>(args: ServiceArgs, config: &Config, scheduler: S) -> Result<i32> {
    if !require_tool(&scheduler, Tool::Query) || !require_tool(&scheduler, Tool::Control) {
        return Ok(1);
    }

    let user = args.user.clone().unwrap_or_else(|| config.user.clone());
    let logs_dir = args.logs_dir.clone().unwrap_or_else(|| config.logs_dir.clone());
    let service = ServiceInfoProbe::new(scheduler, &args.name, user, logs_dir);

    let job_id = match &args.job_id {
        Some(id) => id.clone(),
        None => match service.discover().await {
            Ok(job) => {
                info!("Found running {} job {} on {}", args.name, job.id, job.node);
                job.id
            }
            Err(e @ Error::NotFound(_)) => {
                error!("{}", e);
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        },
    };

    let info = match service.info(&job_id).await {
        Ok(info) => info,
        Err(e @ Error::NotFound(_)) => {
            error!("{}", e);
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };
    print_info(&info, args.port);

    if !args.test {
        return Ok(0);
    }

    let report = service
        .probe(&job_id, args.port, args.base_url.as_deref())
        .await?;
    print_report(&report);

    Ok(if report.outcome.is_healthy() { 0 } else { 1 })
}

fn print_info(info: &ServiceInfo, port: u16) {
    println!("{}", format!("Service job {}", info.job_id).bold());
    println!("  State:     {}", info.state);
    println!("  Node:      {}", info.node.as_deref().unwrap_or("-"));
    println!("  Partition: {}", info.partition.as_deref().unwrap_or("-"));
    if let Some(node) = &info.node {
        let endpoint = ServiceEndpoint::from_node_list(node, port);
        println!("  Endpoint:  {}", endpoint.base_url().cyan());
    }
    match (&info.pid_file, info.pid) {
        (Some(file), Some(pid)) => println!("  PID:       {} ({})", pid, file.display()),
        (Some(file), None) => println!("  PID file:  {} (unreadable)", file.display()),
        (None, _) => println!("  PID:       {}", "no recent PID file".dimmed()),
    }
}

fn print_report(report: &ProbeReport) {
    match &report.outcome {
        ProbeOutcome::Healthy { status } => {
            println!("{} {} is healthy ({})", "✓".green(), report.base_url, status);
            if let Some(version) = &report.version {
                println!("  Version: {}", version);
            }
        }
        ProbeOutcome::Unhealthy { status } => {
            println!("{} {} answered {}", "✗".red(), report.base_url, status);
        }
        ProbeOutcome::NotResponding { reason } => {
            println!("{} {} not responding ({})", "✗".red(), report.base_url, reason);
        }
    }
}
