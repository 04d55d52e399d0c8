//! Environment preparation
//!
//! Verifies and activates what a workload needs before it starts:
//! environment modules, language runtimes, required files and commands,
//! scratch and temp directories.
//!
//! Every operation logs its outcome and returns a `Result`; nothing panics
//! out of here. Activation runs a shell with the values passed as
//! positional parameters, captures the resulting environment with
//! `env -0` and layers the changed variables onto the `JobContext`.

use jobctl_core::executable::find_executable;
use jobctl_core::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, error, info, warn};

use crate::context::JobContext;

/// Shell variables that change on every invocation and are never captured
const VOLATILE_VARS: &[&str] = &["_", "SHLVL", "PWD", "OLDPWD"];

/// Runtime to activate before a workload starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Compiled-language toolchain with an optional environment file
    Toolchain { env_file: PathBuf, command: String },
    /// Interpreter, optionally inside a virtual environment directory
    Virtualenv {
        dir: Option<PathBuf>,
        command: String,
    },
    /// Named conda environment
    Conda { env_name: String, command: String },
}

impl RuntimeKind {
    /// Command expected on `PATH` after activation
    pub fn command(&self) -> &str {
        match self {
            Self::Toolchain { command, .. }
            | Self::Virtualenv { command, .. }
            | Self::Conda { command, .. } => command,
        }
    }
}

/// Conda init scripts, checked in this order
pub fn conda_init_candidates(home: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = home {
        candidates.push(home.join("miniconda3/etc/profile.d/conda.sh"));
        candidates.push(home.join("anaconda3/etc/profile.d/conda.sh"));
    }
    candidates.push(PathBuf::from("/opt/conda/etc/profile.d/conda.sh"));
    candidates.push(PathBuf::from("/opt/miniconda3/etc/profile.d/conda.sh"));
    candidates
}

/// Prepares the environment of one run
#[derive(Debug)]
pub struct EnvironmentPreparer {
    context: JobContext,
    shell: String,
    module_command: String,
    conda_candidates: Vec<PathBuf>,
}

impl EnvironmentPreparer {
    /// Creates a preparer around a context
    pub fn new(context: JobContext) -> Self {
        Self {
            context,
            shell: "bash".to_string(),
            module_command: "module".to_string(),
            conda_candidates: conda_init_candidates(dirs::home_dir().as_deref()),
        }
    }

    /// Uses a different name for the environment-module command
    pub fn with_module_command(mut self, command: impl Into<String>) -> Self {
        self.module_command = command.into();
        self
    }

    /// Replaces the list of conda init scripts
    pub fn with_conda_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.conda_candidates = candidates;
        self
    }

    /// The prepared context
    pub fn context(&self) -> &JobContext {
        &self.context
    }

    /// Mutable access to the prepared context
    pub fn context_mut(&mut self) -> &mut JobContext {
        &mut self.context
    }

    /// Hands the prepared context to the caller
    pub fn into_context(self) -> JobContext {
        self.context
    }

    /// Loads environment modules in order, stopping at the first failure
    pub async fn load_toolchain_modules(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            info!("Loading module {}", name);

            let step = format!("{} load \"$1\"", self.module_command);
            match self
                .capture_environment(true, &[step.as_str()], &[OsStr::new(name)])
                .await
            {
                Ok(vars) => {
                    debug!("Module {} changed {} variable(s)", name, vars.len());
                    self.context.merge_env(vars);
                }
                Err(e) => {
                    error!("Failed to load module {}: {}", name, e);
                    return Err(Error::Environment(format!(
                        "module '{}' failed to load: {}",
                        name, e
                    )));
                }
            }
        }

        if !names.is_empty() {
            info!("Loaded {} module(s)", names.len());
        }
        Ok(())
    }

    /// Activates a runtime and verifies its command is available
    pub async fn activate_runtime(&mut self, kind: &RuntimeKind) -> Result<()> {
        match kind {
            RuntimeKind::Toolchain { env_file, .. } => {
                if env_file.is_file() {
                    info!("Sourcing toolchain environment {}", env_file.display());
                    self.source(&[r#"source "$1""#], &[env_file.as_os_str()])
                        .await?;
                } else {
                    warn!(
                        "Toolchain environment file {} not found, using current environment",
                        env_file.display()
                    );
                }
            }
            RuntimeKind::Virtualenv { dir: Some(dir), .. } => {
                let activate = dir.join("bin").join("activate");
                if !activate.is_file() {
                    error!("No virtual environment at {}", dir.display());
                    return Err(Error::Environment(format!(
                        "virtual environment activation script {} not found",
                        activate.display()
                    )));
                }
                info!("Activating virtual environment {}", dir.display());
                self.source(&[r#"source "$1""#], &[activate.as_os_str()])
                    .await?;
            }
            RuntimeKind::Virtualenv { dir: None, .. } => {
                debug!("No virtual environment requested");
            }
            RuntimeKind::Conda { env_name, .. } => {
                self.activate_conda(env_name).await?;
            }
        }

        self.verify_command(kind.command()).map(|_| ())
    }

    async fn activate_conda(&mut self, env_name: &str) -> Result<()> {
        let init = self
            .conda_candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .cloned();

        match init {
            Some(init) => {
                info!(
                    "Activating conda environment {} via {}",
                    env_name,
                    init.display()
                );
                self.source(
                    &[r#"source "$1""#, r#"conda activate "$2""#],
                    &[init.as_os_str(), OsStr::new(env_name)],
                )
                .await
            }
            None if find_executable("conda", self.context.search_path().as_deref()).is_some() => {
                info!("Activating conda environment {} via conda hook", env_name);
                self.source(
                    &[r#"eval "$(conda shell.bash hook)""#, r#"conda activate "$1""#],
                    &[OsStr::new(env_name)],
                )
                .await
            }
            None => {
                error!("No conda installation found");
                Err(Error::Environment(
                    "no conda init script or conda command found".to_string(),
                ))
            }
        }
    }

    async fn source(&mut self, steps: &[&str], args: &[&OsStr]) -> Result<()> {
        match self.capture_environment(false, steps, args).await {
            Ok(vars) => {
                debug!("Activation changed {} variable(s)", vars.len());
                self.context.merge_env(vars);
                Ok(())
            }
            Err(e) => {
                error!("Activation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Runs `steps` in a shell and returns the variables they changed
    async fn capture_environment(
        &self,
        login: bool,
        steps: &[&str],
        args: &[&OsStr],
    ) -> Result<BTreeMap<String, String>> {
        let mut script = steps
            .iter()
            .map(|step| format!("{} 1>&2", step))
            .collect::<Vec<_>>()
            .join(" && ");
        script.push_str(" && env -0");

        let output = self
            .context
            .command(&self.shell)
            .arg(if login { "-lc" } else { "-c" })
            .arg(&script)
            .arg("jobctl")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Environment(format!("cannot run {}: {}", self.shell, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(Error::Environment(reason));
        }

        Ok(self.changed_vars(&output.stdout))
    }

    fn changed_vars(&self, env_output: &[u8]) -> BTreeMap<String, String> {
        String::from_utf8_lossy(env_output)
            .split('\0')
            .filter_map(|entry| entry.split_once('='))
            .filter(|(key, _)| !key.is_empty() && !VOLATILE_VARS.contains(key))
            .filter(|(key, value)| self.context.var(key).as_deref() != Some(*value))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    /// Checks that a command resolves on the effective `PATH`
    pub fn verify_command(&self, name: &str) -> Result<PathBuf> {
        let search_path: Option<OsString> = self.context.search_path();
        match find_executable(name, search_path.as_deref()) {
            Some(path) => {
                info!("Found command {} at {}", name, path.display());
                Ok(path)
            }
            None => {
                error!("Required command not found: {}", name);
                Err(Error::Environment(format!("command '{}' not found", name)))
            }
        }
    }

    /// Checks that a file exists and returns its size in bytes
    pub fn verify_file(&self, path: &Path, description: &str) -> Result<u64> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {
                info!(
                    "Found {}: {} ({})",
                    description,
                    path.display(),
                    human_size(meta.len())
                );
                Ok(meta.len())
            }
            _ => {
                error!("{} not found: {}", description, path.display());
                Err(Error::Configuration(format!(
                    "{} not found: {}",
                    description,
                    path.display()
                )))
            }
        }
    }

    /// Checks that a directory exists
    pub fn verify_directory(&self, path: &Path, description: &str) -> Result<()> {
        if path.is_dir() {
            info!("Found {}: {}", description, path.display());
            Ok(())
        } else {
            error!("{} not found: {}", description, path.display());
            Err(Error::Configuration(format!(
                "{} not found: {}",
                description,
                path.display()
            )))
        }
    }

    /// Creates a directory tree if it is absent
    pub fn ensure_directory(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            debug!("Directory exists: {}", path.display());
            return Ok(());
        }

        match fs::create_dir_all(path) {
            Ok(()) => {
                info!("Created directory {}", path.display());
                Ok(())
            }
            Err(e) => {
                error!("Failed to create directory {}: {}", path.display(), e);
                Err(Error::Io(e))
            }
        }
    }

    /// Creates `<scratch_base>/<user>/<project>/job_<id>` and publishes it
    pub fn setup_scratch_dir(&mut self, project: &str) -> Result<PathBuf> {
        if project.is_empty() || project.contains('/') {
            return Err(Error::Configuration(format!(
                "invalid project name '{}'",
                project
            )));
        }

        let dir = self
            .context
            .scratch_base
            .join(&self.context.user)
            .join(project)
            .join(format!("job_{}", self.context.job_id));

        self.ensure_directory(&dir)?;
        info!("Scratch directory: {}", dir.display());
        self.context.scratch_dir = Some(dir.clone());
        Ok(dir)
    }

    /// Creates `<temp_base>/job_<user>_<id>` and publishes it
    pub fn setup_temp_dir(&mut self) -> Result<PathBuf> {
        let dir = self
            .context
            .temp_base
            .join(format!("job_{}_{}", self.context.user, self.context.job_id));

        self.ensure_directory(&dir)?;
        info!("Temp directory: {}", dir.display());
        self.context.temp_dir = Some(dir.clone());
        Ok(dir)
    }
}

/// Render a byte count with a binary unit
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
