//! Command handlers
//!
//! One module per program. Each exposes its clap arguments, the component
//! doing the work (generic over the [`Scheduler`](jobctl_scheduler::Scheduler)
//! seam) and a `run` function mapping the outcome to an exit code.

pub mod cancel;
pub mod monitor;
pub mod run;
pub mod service;
pub mod submit;

use jobctl_scheduler::{Scheduler, Tool};
use tracing::error;

/// Checks a scheduler client program, logging guidance when it is absent
pub(crate) fn require_tool<S: Scheduler + ?Sized>(scheduler: &S, tool: Tool) -> bool {
    match scheduler.ensure_available(tool) {
        Ok(()) => true,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}
