//! Error types shared across jobctl crates

use thiserror::Error;

/// Result type alias for jobctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating jobs
///
/// A refused confirmation is not represented here: declining is a
/// successful outcome and is reported as a value by the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid descriptor, configuration or model path
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing command, module or toolchain
    #[error("Environment error: {0}")]
    Environment(String),

    /// No matching job, descriptor or log file
    #[error("Not found: {0}")]
    NotFound(String),

    /// The scheduler or a probed command returned a nonzero status
    #[error("Command `{command}` failed (exit code {code}): {stderr}")]
    ExternalCommand {
        /// Program and arguments that were executed
        command: String,
        /// Exit code, or -1 when terminated by a signal
        code: i32,
        /// Trimmed standard error of the command
        stderr: String,
    },

    /// Scheduler output could not be interpreted
    #[error("Failed to parse scheduler output: {0}")]
    Parse(String),

    /// Filesystem or process I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an external command error
    pub fn external(command: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::ExternalCommand {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_error_message() {
        let err = Error::external("scancel 42", 1, "Invalid job id specified");
        assert_eq!(
            err.to_string(),
            "Command `scancel 42` failed (exit code 1): Invalid job id specified"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found() {
        assert!(Error::NotFound("job 7".into()).is_not_found());
    }
}
