//! Logger
//!
//! Leveled, timestamped logging built on `tracing`. Two layers share one
//! line format:
//! - console: DEBUG/INFO/WARN to stdout, ERROR to stderr, coloured on a terminal
//! - files: the job (or script) log files once they are set up
//!
//! Job logging does not redirect the process streams. Workload output is
//! written through the `TeeWriter`s returned by `JobLogs`, which reach the
//! console and the log files in one write.

mod format;
mod sinks;

pub use format::{LineFormat, TIMESTAMP_FORMAT, from_tracing};
pub use sinks::{FileSinkWriter, FileSinks, SharedFile, TeeWriter};

use chrono::Local;
use jobctl_core::domain::log::LogLevel;
use jobctl_core::{Error, Result};
use std::fmt::Display;
use std::fs;
use std::future::Future;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level, Subscriber, debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Timestamp layout used in log file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Tracing filter for a jobctl threshold
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// A formatted, threshold-filtered layer writing to `writer`
pub fn line_layer<S, W>(writer: W, ansi: bool, threshold: LogLevel) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(LineFormat)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_filter(level_filter(threshold))
}

/// Console layers: ERROR records to `err`, everything else to `out`
///
/// Each stream decides on colour for itself, so redirecting one of them
/// keeps escape codes out of the redirected file.
pub fn console_layers<S, O, E>(
    out: O,
    out_ansi: bool,
    err: E,
    err_ansi: bool,
    threshold: LogLevel,
) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    O: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    E: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    line_layer(out.with_min_level(Level::WARN), out_ansi, threshold).and_then(line_layer(
        err.with_max_level(Level::ERROR),
        err_ansi,
        threshold,
    ))
}

/// Handle to the installed logging layers
#[derive(Debug, Clone)]
pub struct Logger {
    threshold: LogLevel,
    files: FileSinks,
}

impl Logger {
    /// Installs the console and file layers as the global subscriber
    ///
    /// Calling it again in the same process keeps the first subscriber.
    pub fn init(threshold: LogLevel) -> Self {
        let logger = Self::detached(threshold);

        let console = console_layers(
            io::stdout,
            io::stdout().is_terminal(),
            io::stderr,
            io::stderr().is_terminal(),
            threshold,
        );

        let installed = tracing_subscriber::registry()
            .with(console)
            .with(line_layer(logger.files.clone(), false, threshold))
            .try_init();

        if installed.is_err() {
            debug!("Global subscriber already installed, keeping it");
        }

        logger
    }

    /// Creates a logger without installing any subscriber
    pub fn detached(threshold: LogLevel) -> Self {
        Self {
            threshold,
            files: FileSinks::new(),
        }
    }

    /// Minimum level of emitted records
    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }

    /// File sinks fed by the file layer
    pub fn files(&self) -> &FileSinks {
        &self.files
    }

    /// Sets up `<base_dir>/jobs/<job_name>/job_<id>_<timestamp>.{log,err}`
    ///
    /// Both files are opened append-only and attached to the file layer.
    /// The returned handle provides the tee writers for workload output.
    pub fn setup_job_logging(
        &self,
        job_name: &str,
        base_dir: &Path,
        job_id: &str,
    ) -> Result<JobLogs> {
        check_component("job name", job_name)?;

        let dir = base_dir.join("jobs").join(job_name);
        fs::create_dir_all(&dir)?;

        let stamp = Local::now().format(FILE_TIMESTAMP_FORMAT);
        let log_path = dir.join(format!("job_{}_{}.log", job_id, stamp));
        let err_path = dir.join(format!("job_{}_{}.err", job_id, stamp));

        let out = SharedFile::append(&log_path)?;
        let err = SharedFile::append(&err_path)?;
        self.files.attach(out.clone(), err.clone());

        info!("Job logging enabled: {}", log_path.display());
        debug!("Job error log: {}", err_path.display());

        Ok(JobLogs {
            dir,
            log_path,
            err_path,
            out,
            err,
        })
    }

    /// Sets up `<base_dir>/scripts/<script_name>/script_<timestamp>.log`
    ///
    /// Scripts keep a single file: standard error is teed into it as well.
    pub fn setup_script_logging(&self, script_name: &str, base_dir: &Path) -> Result<JobLogs> {
        check_component("script name", script_name)?;

        let dir = base_dir.join("scripts").join(script_name);
        fs::create_dir_all(&dir)?;

        let stamp = Local::now().format(FILE_TIMESTAMP_FORMAT);
        let log_path = dir.join(format!("script_{}.log", stamp));

        let out = SharedFile::append(&log_path)?;
        self.files.attach(out.clone(), out.clone());

        info!("Script logging enabled: {}", log_path.display());

        Ok(JobLogs {
            dir,
            err_path: log_path.clone(),
            log_path,
            err: out.clone(),
            out,
        })
    }
}

fn check_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value == "." || value == ".." {
        return Err(Error::Configuration(format!(
            "invalid {} '{}' for a log directory",
            what, value
        )));
    }
    Ok(())
}

/// Log files of one job or script run
#[derive(Debug, Clone)]
pub struct JobLogs {
    /// Directory holding the files
    pub dir: PathBuf,
    /// Standard output log
    pub log_path: PathBuf,
    /// Standard error log (same as `log_path` for scripts)
    pub err_path: PathBuf,
    out: SharedFile,
    err: SharedFile,
}

impl JobLogs {
    /// Tee of the process stdout and the output log
    pub fn stdout(&self) -> TeeWriter<io::Stdout, SharedFile> {
        TeeWriter::new(io::stdout(), self.out.clone())
    }

    /// Tee of the process stderr and the error log
    pub fn stderr(&self) -> TeeWriter<io::Stderr, SharedFile> {
        TeeWriter::new(io::stderr(), self.err.clone())
    }

    /// Tee of an arbitrary console writer and the output log
    pub fn tee_stdout<W: io::Write>(&self, console: W) -> TeeWriter<W, SharedFile> {
        TeeWriter::new(console, self.out.clone())
    }

    /// Tee of an arbitrary console writer and the error log
    pub fn tee_stderr<W: io::Write>(&self, console: W) -> TeeWriter<W, SharedFile> {
        TeeWriter::new(console, self.err.clone())
    }
}

/// Runs `operation`, logging its start, end, elapsed seconds and outcome
///
/// The operation's result is returned unchanged.
pub async fn log_duration<F, T, E>(description: &str, operation: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let started_at = Local::now();
    let started = Instant::now();
    info!(
        "Starting {} at {}",
        description,
        started_at.format(TIMESTAMP_FORMAT)
    );

    let result = operation.await;

    let elapsed = started.elapsed().as_secs();
    let finished_at = Local::now().format(TIMESTAMP_FORMAT);
    match &result {
        Ok(_) => info!(
            "Finished {} at {} ({}s, success)",
            description, finished_at, elapsed
        ),
        Err(e) => error!(
            "Finished {} at {} ({}s, failed): {}",
            description, finished_at, elapsed, e
        ),
    }

    result
}

/// In-memory capture of formatted log lines for tests
#[cfg(test)]
pub(crate) mod capture {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing::Dispatch;

    #[derive(Debug, Clone, Default)]
    pub struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }

        pub fn lines_with(&self, needle: &str) -> usize {
            self.contents().lines().filter(|l| l.contains(needle)).count()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Dispatch formatting every record at or above `threshold` into a buffer
    pub fn dispatch(threshold: LogLevel) -> (Dispatch, Buffer) {
        let buffer = Buffer::default();
        let subscriber =
            tracing_subscriber::registry().with(line_layer(buffer.clone(), false, threshold));
        (Dispatch::new(subscriber), buffer)
    }
}
