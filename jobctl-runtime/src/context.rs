//! Execution context for a job or script run
//!
//! Holds the state the programs would otherwise keep in exported shell
//! variables: job identity, log files, scratch and temp directories, and
//! the environment produced by module loads and runtime activation.
//! Child processes are built from the context so they see the same state.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tokio::process::Command;

use crate::config::Config;
use crate::logging::JobLogs;

/// Variable through which children learn the job temp directory
pub const TEMP_DIR_VAR: &str = "JOB_TEMP_DIR";

/// Variable through which children learn the job scratch directory
pub const SCRATCH_DIR_VAR: &str = "JOB_SCRATCH_DIR";

/// Variable through which children learn the job log directory
pub const LOG_DIR_VAR: &str = "JOB_LOG_DIR";

/// State shared across one run
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Scheduler job id, or `local`
    pub job_id: String,

    /// Current user name
    pub user: String,

    /// Root of the log tree
    pub logs_dir: PathBuf,

    /// Base of per-user scratch directories
    pub scratch_base: PathBuf,

    /// Base of per-job temp directories
    pub temp_base: PathBuf,

    /// Scratch directory, once set up
    pub scratch_dir: Option<PathBuf>,

    /// Temp directory, once set up
    pub temp_dir: Option<PathBuf>,

    /// Log files, once job or script logging is set up
    pub logs: Option<JobLogs>,

    /// Variables layered over the process environment
    env: BTreeMap<String, String>,
}

impl JobContext {
    /// Creates a context from runtime configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_id: config.job_id_or_local().to_string(),
            user: config.user.clone(),
            logs_dir: config.logs_dir.clone(),
            scratch_base: config.scratch_base.clone(),
            temp_base: config.temp_base.clone(),
            scratch_dir: None,
            temp_dir: None,
            logs: None,
            env: BTreeMap::new(),
        }
    }

    /// Variables layered over the process environment
    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Sets one overlay variable
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Merges captured variables into the overlay
    pub fn merge_env(&mut self, vars: BTreeMap<String, String>) {
        self.env.extend(vars);
    }

    /// Effective value of a variable: overlay first, then the process
    pub fn var(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// Effective `PATH` used for command lookups
    pub fn search_path(&self) -> Option<OsString> {
        match self.env.get("PATH") {
            Some(path) => Some(OsString::from(path)),
            None => std::env::var_os("PATH"),
        }
    }

    /// Variables a child process receives on top of the process environment
    pub fn child_env(&self) -> BTreeMap<String, String> {
        let mut vars = self.env.clone();

        if let Some(dir) = &self.temp_dir {
            vars.insert(TEMP_DIR_VAR.to_string(), dir.to_string_lossy().to_string());
        }
        if let Some(dir) = &self.scratch_dir {
            vars.insert(SCRATCH_DIR_VAR.to_string(), dir.to_string_lossy().to_string());
        }
        if let Some(logs) = &self.logs {
            vars.insert(LOG_DIR_VAR.to_string(), logs.dir.to_string_lossy().to_string());
        }

        vars
    }

    /// Builds a command that runs with this context's environment
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut command = Command::new(program);
        command.envs(self.child_env());
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> JobContext {
        let config = Config::from_vars(|key| match key {
            "USER" => Some("alice".to_string()),
            "SLURM_JOB_ID" => Some("99".to_string()),
            _ => None,
        });
        JobContext::from_config(&config)
    }

    #[test]
    fn test_from_config() {
        let context = context();
        assert_eq!(context.job_id, "99");
        assert_eq!(context.user, "alice");
        assert!(context.temp_dir.is_none());
        assert!(context.env_overlay().is_empty());
    }

    #[test]
    fn test_overlay_takes_precedence() {
        let mut context = context();
        context.set_var("PATH", "/opt/tool/bin");
        context.set_var("JOBCTL_TEST_ONLY_VAR", "1");

        assert_eq!(context.search_path(), Some(OsString::from("/opt/tool/bin")));
        assert_eq!(context.var("JOBCTL_TEST_ONLY_VAR"), Some("1".to_string()));
    }

    #[test]
    fn test_child_env_publishes_directories() {
        let mut context = context();
        context.temp_dir = Some(PathBuf::from("/tmp/job_alice_99"));
        context.scratch_dir = Some(PathBuf::from("/scratch/alice/llm/job_99"));

        let vars = context.child_env();
        assert_eq!(vars.get(TEMP_DIR_VAR).unwrap(), "/tmp/job_alice_99");
        assert_eq!(vars.get(SCRATCH_DIR_VAR).unwrap(), "/scratch/alice/llm/job_99");
        assert!(!vars.contains_key(LOG_DIR_VAR));
    }
}
