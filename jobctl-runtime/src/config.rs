//! Runtime configuration
//!
//! Settings shared by every jobctl program: log threshold, log tree
//! location, scratch and temp bases, and the identity of the current user
//! and scheduler job.

use jobctl_core::domain::log::LogLevel;
use std::path::PathBuf;

/// Default root of the log tree
pub const DEFAULT_LOGS_DIR: &str = "logs";

/// Default scratch base when `SCRATCH_BASE` is unset
pub const DEFAULT_SCRATCH_BASE: &str = "/scratch";

/// Default temp base when `TMPDIR` is unset
pub const DEFAULT_TEMP_BASE: &str = "/tmp";

/// Job id used when not running inside a scheduler allocation
pub const LOCAL_JOB_ID: &str = "local";

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum level of emitted log records
    pub log_level: LogLevel,

    /// Root of the log tree (`<logs_dir>/jobs`, `<logs_dir>/scripts`)
    pub logs_dir: PathBuf,

    /// Base of per-user scratch directories
    pub scratch_base: PathBuf,

    /// Base of per-job temp directories
    pub temp_base: PathBuf,

    /// Current user name
    pub user: String,

    /// Scheduler job id, `None` outside an allocation
    pub job_id: Option<String>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognised variables:
    /// - LOG_LEVEL (optional, 0=DEBUG 1=INFO 2=WARN 3=ERROR, default: 1)
    /// - JOBCTL_LOGS_DIR (optional, default: logs)
    /// - SCRATCH_BASE (optional, default: /scratch)
    /// - TMPDIR (optional, default: /tmp)
    /// - USER, falling back to LOGNAME
    /// - SLURM_JOB_ID (set by the scheduler inside an allocation)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_level = non_empty("LOG_LEVEL")
            .and_then(|v| LogLevel::from_verbosity(&v))
            .unwrap_or_default();

        let logs_dir = non_empty("JOBCTL_LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGS_DIR));

        let scratch_base = non_empty("SCRATCH_BASE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_BASE));

        let temp_base = non_empty("TMPDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_BASE));

        let user = non_empty("USER")
            .or_else(|| non_empty("LOGNAME"))
            .unwrap_or_default();

        Self {
            log_level,
            logs_dir,
            scratch_base,
            temp_base,
            user,
            job_id: non_empty("SLURM_JOB_ID"),
        }
    }

    /// Job id for file names: the scheduler id, or `local`
    pub fn job_id_or_local(&self) -> &str {
        self.job_id.as_deref().unwrap_or(LOCAL_JOB_ID)
    }

    /// Overrides the logs directory
    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.user.is_empty() {
            anyhow::bail!("current user is unknown: set USER");
        }

        if self.user.contains('/') {
            anyhow::bail!("user name must not contain '/'");
        }

        if self.logs_dir.as_os_str().is_empty() {
            anyhow::bail!("logs_dir cannot be empty");
        }

        if let Some(job_id) = &self.job_id {
            if job_id.contains('/') {
                anyhow::bail!("job id must not contain '/'");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}
