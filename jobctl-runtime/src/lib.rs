//! Jobctl runtime
//!
//! Services shared by every jobctl program:
//! - `config`: settings read from the environment
//! - `logging`: leveled console and file logging, output teeing, timing
//! - `cleanup`: ordered shutdown tasks and signal-aware program lifecycle
//! - `context`: per-run state handed to child processes
//! - `environment`: module loads, runtime activation and resource checks

pub mod cleanup;
pub mod config;
pub mod context;
pub mod environment;
pub mod logging;

pub use cleanup::{CleanupRegistry, CleanupSummary, Lifecycle, Termination};
pub use config::Config;
pub use context::JobContext;
pub use environment::{EnvironmentPreparer, RuntimeKind};
pub use logging::{JobLogs, Logger, log_duration};
