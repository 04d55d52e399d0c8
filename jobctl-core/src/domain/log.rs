//! Log domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log record
///
/// Levels are totally ordered: `Debug < Info < Warn < Error`. A record is
/// emitted to a sink only when its level is at or above the configured
/// threshold.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse the numeric verbosity selector (`0`..=`3`)
    ///
    /// Returns `None` for anything outside the four recognised values.
    pub fn from_verbosity(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(Self::Debug),
            "1" => Some(Self::Info),
            "2" => Some(Self::Warn),
            "3" => Some(Self::Error),
            _ => None,
        }
    }

    /// Numeric verbosity of this level
    pub fn verbosity(self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warn => 2,
            Self::Error => 3,
        }
    }

    /// Whether a record at this level passes the given threshold
    pub fn passes(self, threshold: LogLevel) -> bool {
        self >= threshold
    }

    /// Upper-case label used in formatted lines
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LogLevel; 4] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    #[test]
    fn test_emitted_iff_at_or_above_threshold() {
        for threshold in ALL {
            for level in ALL {
                assert_eq!(
                    level.passes(threshold),
                    level.verbosity() >= threshold.verbosity(),
                    "level {level} against threshold {threshold}"
                );
            }
        }
    }

    #[test]
    fn test_threshold_boundaries() {
        assert!(ALL.iter().all(|l| l.passes(LogLevel::Debug)));
        let at_error: Vec<_> = ALL.iter().filter(|l| l.passes(LogLevel::Error)).collect();
        assert_eq!(at_error, vec![&LogLevel::Error]);
    }

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity("0"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_verbosity("3"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_verbosity(" 2 "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_verbosity("4"), None);
        assert_eq!(LogLevel::from_verbosity("info"), None);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
