//! Slurm implementation of the scheduler interface
//!
//! Every call spawns one Slurm client program with a discrete argument list.
//! No shell is involved, so job names and paths are never re-parsed.

use async_trait::async_trait;
use jobctl_core::domain::job::{JobDetails, JobHandle, JobState};
use jobctl_core::executable::which;
use jobctl_core::{Error, Result};
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::parse::{
    SQUEUE_FORMAT, is_unknown_job, parse_scontrol_record, parse_squeue, parse_submitted_job_id,
};
use crate::{JobQuery, Scheduler, Submission, Tool};

/// Names (or paths) of the Slurm client programs
#[derive(Debug, Clone)]
pub struct SlurmPrograms {
    pub sbatch: String,
    pub squeue: String,
    pub scontrol: String,
    pub scancel: String,
}

impl Default for SlurmPrograms {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            scontrol: "scontrol".to_string(),
            scancel: "scancel".to_string(),
        }
    }
}

impl SlurmPrograms {
    fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Submit => &self.sbatch,
            Tool::Query => &self.squeue,
            Tool::Control => &self.scontrol,
            Tool::Cancel => &self.scancel,
        }
    }
}

/// Scheduler client backed by the Slurm command-line tools
#[derive(Debug, Clone, Default)]
pub struct SlurmScheduler {
    programs: SlurmPrograms,
}

impl SlurmScheduler {
    /// Creates a client using the programs found on `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client with explicit program locations
    pub fn with_programs(programs: SlurmPrograms) -> Self {
        Self { programs }
    }

    /// Runs a client program and returns its stdout
    ///
    /// # Errors
    /// - `Error::Environment` if the program cannot be spawned
    /// - `Error::ExternalCommand` if it exits nonzero
    async fn run(&self, tool: Tool, args: &[OsString]) -> Result<String> {
        let program = self.programs.program(tool);
        let rendered = render(program, args);
        debug!("Running {}", rendered);

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Environment(format!("'{}' not found on PATH", program))
                } else {
                    Error::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            debug!("{} exited with {}: {}", rendered, code, stderr);
            return Err(Error::external(rendered, code, stderr));
        }

        Ok(stdout)
    }
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    fn ensure_available(&self, tool: Tool) -> Result<()> {
        let program = self.programs.program(tool);
        match which(program) {
            Some(path) => {
                debug!("Found {} at {}", program, path.display());
                Ok(())
            }
            None => Err(Error::Environment(format!(
                "'{}' not found on PATH. Is the Slurm client installed and loaded?",
                program
            ))),
        }
    }

    async fn submit(&self, descriptor: &Path) -> Result<Submission> {
        let stdout = self
            .run(Tool::Submit, &[descriptor.as_os_str().to_os_string()])
            .await?;

        Ok(Submission {
            job_id: parse_submitted_job_id(&stdout),
            message: stdout.trim().to_string(),
        })
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobHandle>> {
        let stdout = self.run(Tool::Query, &squeue_args(query)).await?;
        parse_squeue(&stdout)
    }

    async fn job_details(&self, job_id: &str) -> Result<Option<JobDetails>> {
        let args = ["--oneliner", "show", "job", job_id].map(OsString::from);

        match self.run(Tool::Control, &args).await {
            Ok(stdout) => Ok(parse_scontrol_record(&stdout)),
            Err(Error::ExternalCommand { ref stderr, .. }) if is_unknown_job(stderr) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        self.run(Tool::Cancel, &[OsString::from(job_id)]).await?;
        Ok(())
    }

    async fn cancel_user_jobs(&self, user: &str) -> Result<()> {
        let args = ["--user", user].map(OsString::from);
        self.run(Tool::Cancel, &args).await?;
        Ok(())
    }
}

/// Argument list for a `squeue` listing
pub(crate) fn squeue_args(query: &JobQuery) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--noheader".into(), "--format".into(), SQUEUE_FORMAT.into()];

    if let Some(user) = &query.user {
        args.push("--user".into());
        args.push(user.into());
    }

    match &query.states {
        Some(states) => {
            let states: Vec<&str> = states.iter().map(|s| JobState::as_str(*s)).collect();
            args.push("--states".into());
            args.push(states.join(",").into());
        }
        None => {
            args.push("--states".into());
            args.push("all".into());
        }
    }

    if let Some(name) = &query.name {
        args.push("--name".into());
        args.push(name.into());
    }

    args
}

fn render(program: &str, args: &[OsString]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
