//! Workload launcher
//!
//! Runs a workload inside a scheduler allocation the way every job script
//! does: job logging first, then modules and runtime activation, optional
//! scratch and temp directories, and finally the command itself with its
//! output teed into the job log files.
//!
//! With `--service` the workload is a long-running server. Its PID is
//! published next to the job logs and the launcher checks every 60 seconds
//! that it is still alive, exiting with a failure code once it is not.

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use jobctl_core::executable::find_executable;
use jobctl_runtime::{
    CleanupRegistry, Config, EnvironmentPreparer, JobContext, JobLogs, Lifecycle, Logger,
    RuntimeKind, log_duration,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Period of the service liveness check
pub const SUPERVISE_INTERVAL: Duration = Duration::from_secs(60);

/// How long an exited workload's remaining output may take to reach the logs
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Variable through which the workload learns its service port
pub const SERVICE_PORT_VAR: &str = "JOB_SERVICE_PORT";

/// Run a workload with job logging, environment setup and cleanup
#[derive(Parser, Debug)]
#[command(
    name = "job-run",
    version,
    group(ArgGroup::new("runtime").args(["conda", "venv", "toolchain_env"]))
)]
pub struct RunArgs {
    /// Job name, used for the log directory and PID files
    #[arg(long)]
    pub name: String,

    /// Use script logging (one log file under logs/scripts)
    #[arg(long)]
    pub script: bool,

    /// Treat the workload as a long-running service
    #[arg(long)]
    pub service: bool,

    /// Port the service listens on, passed to it as JOB_SERVICE_PORT
    #[arg(long)]
    pub port: Option<u16>,

    /// Environment module to load (repeatable, loaded in order)
    #[arg(long = "module", value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Conda environment to activate
    #[arg(long, value_name = "ENV")]
    pub conda: Option<String>,

    /// Virtual environment directory to activate
    #[arg(long, value_name = "DIR")]
    pub venv: Option<PathBuf>,

    /// Toolchain environment file to source
    #[arg(long, value_name = "FILE")]
    pub toolchain_env: Option<PathBuf>,

    /// Command that must be available after activation (default: the workload program)
    #[arg(long, value_name = "CMD")]
    pub expect: Option<String>,

    /// Create a scratch directory for this project
    #[arg(long, value_name = "PROJECT")]
    pub scratch: Option<String>,

    /// Create a per-job temp directory
    #[arg(long)]
    pub temp: bool,

    /// Workload command and its arguments
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunArgs {
    fn expected_command(&self) -> String {
        self.expect
            .clone()
            .or_else(|| self.command.first().cloned())
            .unwrap_or_default()
    }

    /// Runtime requested on the command line
    pub fn runtime(&self) -> Option<RuntimeKind> {
        let command = self.expected_command();
        if let Some(env_name) = &self.conda {
            Some(RuntimeKind::Conda {
                env_name: env_name.clone(),
                command,
            })
        } else if let Some(dir) = &self.venv {
            Some(RuntimeKind::Virtualenv {
                dir: Some(dir.clone()),
                command,
            })
        } else {
            self.toolchain_env
                .as_ref()
                .map(|env_file| RuntimeKind::Toolchain {
                    env_file: env_file.clone(),
                    command,
                })
        }
    }
}

/// Launches one workload
pub struct WorkloadRunner {
    logger: Logger,
    config: Config,
    registry: CleanupRegistry,
    supervise_interval: Duration,
}

impl WorkloadRunner {
    pub fn new(logger: Logger, config: Config, registry: CleanupRegistry) -> Self {
        Self {
            logger,
            config,
            registry,
            supervise_interval: SUPERVISE_INTERVAL,
        }
    }

    /// Overrides the service liveness check period
    pub fn with_supervise_interval(mut self, interval: Duration) -> Self {
        self.supervise_interval = interval;
        self
    }

    /// Runs the workload and returns its exit code
    pub async fn execute(&self, args: &RunArgs) -> Result<i32> {
        let mut context = JobContext::from_config(&self.config);

        let logs = if args.script {
            self.logger
                .setup_script_logging(&args.name, &context.logs_dir)?
        } else {
            self.logger
                .setup_job_logging(&args.name, &context.logs_dir, &context.job_id)?
        };
        context.logs = Some(logs.clone());
        info!("Job {} (id {}, user {})", args.name, context.job_id, context.user);

        let context = self.prepare(args, context).await?;

        let mut child = spawn_workload(&context, &args.command)?;
        let pumps = forward_output(&mut child, &logs);

        if args.service {
            return self.supervise(args, &context, &logs, child, pumps).await;
        }

        let status = child
            .wait()
            .await
            .context("failed to wait for the workload")?;
        drain_output(pumps).await;

        let code = status.code().unwrap_or(1);
        if status.success() {
            info!("Workload finished successfully");
        } else {
            warn!("Workload exited with {}", status);
        }
        Ok(code)
    }

    async fn prepare(&self, args: &RunArgs, context: JobContext) -> Result<JobContext> {
        let mut preparer = EnvironmentPreparer::new(context);

        preparer.load_toolchain_modules(&args.modules).await?;

        match args.runtime() {
            Some(kind) => preparer.activate_runtime(&kind).await?,
            None => {
                if let Some(command) = &args.expect {
                    preparer.verify_command(command)?;
                }
            }
        }

        if let Some(port) = args.port {
            preparer
                .context_mut()
                .set_var(SERVICE_PORT_VAR, port.to_string());
        }

        if let Some(project) = &args.scratch {
            let dir = preparer.setup_scratch_dir(project)?;
            self.register_removal("scratch", dir);
        }

        if args.temp {
            let dir = preparer.setup_temp_dir()?;
            self.register_removal("temp", dir);
        }

        Ok(preparer.into_context())
    }

    fn register_removal(&self, what: &str, dir: PathBuf) {
        self.registry
            .register(format!("remove {} directory {}", what, dir.display()), move || {
                match fs::remove_dir_all(&dir) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e).with_context(|| format!("cannot remove {}", dir.display())),
                }
            });
    }

    async fn supervise(
        &self,
        args: &RunArgs,
        context: &JobContext,
        logs: &JobLogs,
        child: Child,
        pumps: Vec<JoinHandle<()>>,
    ) -> Result<i32> {
        let pid = child
            .id()
            .context("workload exited before its PID was known")?;

        let pid_files = write_pid_files(&logs.dir, &args.name, &context.job_id, pid)?;
        self.registry
            .register("remove PID files", move || remove_files(&pid_files));

        let child = Arc::new(Mutex::new(child));
        let handle = Arc::clone(&child);
        self.registry
            .register(format!("stop workload (PID {})", pid), move || stop_child(&handle));

        info!("Service {} started with PID {}", args.name, pid);
        if let Some(port) = args.port {
            info!("Service port: {}", port);
        }

        let mut ticker = tokio::time::interval(self.supervise_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;

            let status = lock(&child)
                .try_wait()
                .context("cannot check the workload status")?;
            match status {
                None => debug!("Service {} (PID {}) is alive", args.name, pid),
                Some(status) => {
                    drain_output(pumps).await;
                    error!("Service {} (PID {}) exited: {}", args.name, pid, status);
                    return Ok(1);
                }
            }
        }
    }
}

/// Entry point of the `job-run` program
pub async fn run(args: RunArgs, config: Config, logger: Logger) -> Result<i32> {
    config.validate()?;

    let registry = CleanupRegistry::new();
    let lifecycle = Lifecycle::new(registry.clone());
    let runner = WorkloadRunner::new(logger, config, registry);

    let description = format!("job {}", args.name);
    Ok(lifecycle
        .run(log_duration(&description, runner.execute(&args)))
        .await)
}

/// Writes `<name>.pid` and `<name>_<job_id>.pid` holding the bare PID
pub fn write_pid_files(dir: &Path, name: &str, job_id: &str, pid: u32) -> Result<Vec<PathBuf>> {
    let files = vec![
        dir.join(format!("{}.pid", name)),
        dir.join(format!("{}_{}.pid", name, job_id)),
    ];

    for file in &files {
        fs::write(file, format!("{}\n", pid))
            .with_context(|| format!("cannot write PID file {}", file.display()))?;
        debug!("Wrote PID file {}", file.display());
    }

    Ok(files)
}

fn remove_files(files: &[PathBuf]) -> Result<()> {
    for file in files {
        match fs::remove_file(file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("cannot remove {}", file.display())),
        }
    }
    Ok(())
}

fn lock(child: &Mutex<Child>) -> std::sync::MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stop_child(child: &Mutex<Child>) -> Result<()> {
    let mut child = lock(child);
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    child.start_kill().context("cannot stop the workload")
}

fn spawn_workload(context: &JobContext, command: &[String]) -> Result<Child> {
    let Some((program, args)) = command.split_first() else {
        bail!("no workload command given");
    };

    let resolved = if program.contains('/') {
        PathBuf::from(program)
    } else {
        find_executable(program, context.search_path().as_deref())
            .with_context(|| format!("command '{}' not found", program))?
    };

    info!("Starting {}", command.join(" "));
    context
        .command(&resolved)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", program))
}

fn forward_output(child: &mut Child, logs: &JobLogs) -> Vec<JoinHandle<()>> {
    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, logs.stdout()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, logs.stderr()));
    }
    pumps
}

/// Waits for the output pumps of an exited workload, up to `OUTPUT_DRAIN_TIMEOUT`
///
/// A descendant that inherited the pipes can keep them open past the
/// workload's exit, so the wait is bounded.
async fn drain_output(pumps: Vec<JoinHandle<()>>) {
    let all = async {
        for pump in pumps {
            let _ = pump.await;
        }
    };
    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, all).await.is_err() {
        warn!(
            "Workload output still open after {}s, not waiting for it",
            OUTPUT_DRAIN_TIMEOUT.as_secs()
        );
    }
}

/// Copies `reader` line by line into `writer` until end of input
fn pump<R, W>(reader: R, mut writer: W) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut write_failed = false;

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    // keep draining after a failed write so the child never blocks
                    if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
                        if !write_failed {
                            warn!("Cannot forward workload output: {}", e);
                            write_failed = true;
                        }
                    }
                }
                Err(e) => {
                    warn!("Cannot read workload output: {}", e);
                    break;
                }
            }
        }
    })
}
