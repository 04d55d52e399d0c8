//! Cleanup registry and program lifecycle
//!
//! Shutdown actions are registered while a program runs and executed once,
//! in registration order, when it ends. `Lifecycle::run` wraps the whole
//! program body so the cleanup pass happens on normal return, on error and
//! on SIGINT/SIGTERM.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Exit code after an interrupt (SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code after a termination request (SIGTERM)
pub const EXIT_TERMINATED: i32 = 143;

type Action = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A deferred shutdown action
pub struct CleanupTask {
    description: String,
    action: Action,
}

impl CleanupTask {
    /// Human-readable description of the task
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for CleanupTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupTask")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Outcome of a cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub attempted: usize,
    pub failed: usize,
}

impl fmt::Display for CleanupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} failed", self.failed, self.attempted)
    }
}

/// Ordered collection of shutdown actions
///
/// Clones share the same task list, so tasks can be registered from any
/// part of the program.
#[derive(Debug, Clone, Default)]
pub struct CleanupRegistry {
    tasks: Arc<Mutex<Vec<CleanupTask>>>,
}

impl CleanupRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a shutdown action
    pub fn register<F>(&self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let task = CleanupTask {
            description: description.into(),
            action: Box::new(action),
        };
        debug!("Registered cleanup task: {}", task.description);
        self.lock().push(task);
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no tasks are pending
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs and clears every pending task
    ///
    /// Tasks run in registration order. A task that fails or panics is
    /// logged as a warning and counted; the remaining tasks still run.
    /// Calling this on an empty registry is a no-op.
    pub fn execute_all(&self, exit_code: i32) -> CleanupSummary {
        let tasks = std::mem::take(&mut *self.lock());
        if tasks.is_empty() {
            return CleanupSummary::default();
        }

        info!(
            "Running {} cleanup task(s) (exit code {})",
            tasks.len(),
            exit_code
        );

        let mut summary = CleanupSummary::default();
        for task in tasks {
            summary.attempted += 1;
            debug!("Cleanup: {}", task.description);

            match catch_unwind(AssertUnwindSafe(task.action)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    summary.failed += 1;
                    warn!("Cleanup task '{}' failed: {:#}", task.description, e);
                }
                Err(_) => {
                    summary.failed += 1;
                    warn!("Cleanup task '{}' panicked", task.description);
                }
            }
        }

        if summary.failed > 0 {
            warn!("Cleanup finished: {}", summary);
        } else {
            info!("Cleanup finished: {} task(s) completed", summary.attempted);
        }

        summary
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CleanupTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Termination signal that ended a program body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

impl Termination {
    /// Conventional exit code for the signal
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => EXIT_INTERRUPTED,
            Self::Terminate => EXIT_TERMINATED,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// Runs the registry's tasks when dropped
///
/// Covers exit paths that skip the explicit pass, such as a panic
/// unwinding out of the program body.
struct CleanupGuard {
    registry: CleanupRegistry,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            self.registry.execute_all(1);
        }
    }
}

/// Scoped wrapper guaranteeing a cleanup pass on every exit path
#[derive(Debug, Clone)]
pub struct Lifecycle {
    registry: CleanupRegistry,
}

impl Lifecycle {
    /// Creates a lifecycle around a registry
    pub fn new(registry: CleanupRegistry) -> Self {
        Self { registry }
    }

    /// The registry cleaned up by this lifecycle
    pub fn registry(&self) -> &CleanupRegistry {
        &self.registry
    }

    /// Runs `body`, then the cleanup pass, and returns the exit code
    ///
    /// - `Ok(code)`: cleanup, then `code`
    /// - `Err(e)`: error logged, cleanup, then 1
    /// - SIGINT/SIGTERM first: warning logged, cleanup, then 130/143
    pub async fn run<F>(&self, body: F) -> i32
    where
        F: Future<Output = anyhow::Result<i32>>,
    {
        self.run_until(body, wait_for_termination()).await
    }

    /// Like `run`, with an explicit termination source
    pub async fn run_until<F, T>(&self, body: F, termination: T) -> i32
    where
        F: Future<Output = anyhow::Result<i32>>,
        T: Future<Output = Termination>,
    {
        let guard = CleanupGuard {
            registry: self.registry.clone(),
        };

        let exit_code = tokio::select! {
            result = body => match result {
                Ok(code) => code,
                Err(e) => {
                    error!("{:#}", e);
                    1
                }
            },
            signal = termination => {
                warn!("Received {}, running cleanup before exit", signal.name());
                signal.exit_code()
            }
        };

        guard.registry.execute_all(exit_code);
        exit_code
    }
}

/// Resolves when SIGINT or SIGTERM arrives
#[cfg(unix)]
pub async fn wait_for_termination() -> Termination {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => Termination::Interrupt,
        _ = sigterm.recv() => Termination::Terminate,
    }
}

/// Resolves when Ctrl-C arrives
#[cfg(not(unix))]
pub async fn wait_for_termination() -> Termination {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", e);
        return std::future::pending().await;
    }
    Termination::Interrupt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture;
    use jobctl_core::domain::log::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_failing_task_does_not_stop_others() {
        let (dispatch, buffer) = capture::dispatch(LogLevel::Info);
        let registry = CleanupRegistry::new();
        let ran = counter();

        let first = ran.clone();
        registry.register("remove temp dir", move || {
            first.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("permission denied")
        });
        let second = ran.clone();
        registry.register("stop server", move || {
            second.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let summary =
            tracing::dispatcher::with_default(&dispatch, || registry.execute_all(0));

        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(summary, CleanupSummary { attempted: 2, failed: 1 });
        assert_eq!(summary.to_string(), "1/2 failed");
        assert_eq!(buffer.lines_with("[WARN] Cleanup task 'remove temp dir' failed"), 1);
        assert_eq!(buffer.lines_with("Cleanup finished: 1/2 failed"), 1);
    }

    #[test]
    fn test_execute_all_is_idempotent() {
        let registry = CleanupRegistry::new();
        let ran = counter();
        let inner = ran.clone();
        registry.register("once", move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.execute_all(0).attempted, 1);
        assert!(registry.is_empty());
        assert_eq!(registry.execute_all(0), CleanupSummary::default());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tasks_run_in_registration_order() {
        let registry = CleanupRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            registry.register(name, move || {
                order.lock().unwrap().push(name);
                Ok(())
            });
        }

        registry.execute_all(0);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_task_is_isolated() {
        let registry = CleanupRegistry::new();
        let ran = counter();
        registry.register("explodes", || panic!("boom"));
        let inner = ran.clone();
        registry.register("after", move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let summary = registry.execute_all(0);
        assert_eq!(summary.failed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_termination_exit_codes() {
        assert_eq!(Termination::Interrupt.exit_code(), 130);
        assert_eq!(Termination::Terminate.exit_code(), 143);
    }

    #[tokio::test]
    async fn test_lifecycle_normal_exit_runs_cleanup() {
        let registry = CleanupRegistry::new();
        let ran = counter();
        let inner = ran.clone();
        registry.register("task", move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let lifecycle = Lifecycle::new(registry.clone());
        let code = lifecycle
            .run_until(async { Ok(3) }, std::future::pending())
            .await;

        assert_eq!(code, 3);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_error_exit_runs_cleanup() {
        let registry = CleanupRegistry::new();
        let ran = counter();
        let inner = ran.clone();
        registry.register("task", move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let code = Lifecycle::new(registry)
            .run_until(
                async { Err(anyhow::anyhow!("workload failed")) },
                std::future::pending(),
            )
            .await;

        assert_eq!(code, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_signal_runs_cleanup() {
        let registry = CleanupRegistry::new();
        let ran = counter();
        let inner = ran.clone();
        registry.register("task", move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let code = Lifecycle::new(registry)
            .run_until(std::future::pending(), async { Termination::Terminate })
            .await;

        assert_eq!(code, 143);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
