//! jobctl command-line programs
//!
//! Handlers behind the `submit`, `monitor`, `cancel`, `service-info` and
//! `job-run` binaries. Each binary parses its own arguments, calls
//! [`bootstrap`] and hands over to one module in [`commands`].

pub mod commands;
pub mod prompt;

#[cfg(test)]
pub(crate) mod testing;

use jobctl_runtime::{Config, Logger};
use tracing::error;

/// Reads configuration from the environment and installs the logger
pub fn bootstrap() -> (Config, Logger) {
    let config = Config::from_env();
    let logger = Logger::init(config.log_level);
    (config, logger)
}

/// Exits the process with the code a command handler produced
///
/// Errors are logged and mapped to exit code 1.
pub fn exit_with(result: anyhow::Result<i32>) -> ! {
    let code = match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    std::process::exit(code)
}
