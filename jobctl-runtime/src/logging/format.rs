//! Line format shared by console and file output
//!
//! Every record renders as `[YYYY-MM-DD HH:MM:SS] [LEVEL] message`.

use chrono::Local;
use colored::{ColoredString, Colorize};
use jobctl_core::domain::log::LogLevel;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Timestamp layout of formatted lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Event formatter producing `[timestamp] [LEVEL] message`
///
/// The level label is coloured only when the writer accepts ANSI escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = from_tracing(event.metadata().level());
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);

        if writer.has_ansi_escapes() {
            write!(writer, "[{}] [{}] ", timestamp, paint(level))?;
        } else {
            write!(writer, "[{}] [{}] ", timestamp, level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Map a tracing level onto the four jobctl levels
pub fn from_tracing(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

fn paint(level: LogLevel) -> ColoredString {
    let label = level.as_str();
    match level {
        LogLevel::Debug => label.dimmed(),
        LogLevel::Info => label.green(),
        LogLevel::Warn => label.yellow(),
        LogLevel::Error => label.red().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tracing() {
        assert_eq!(from_tracing(&Level::TRACE), LogLevel::Debug);
        assert_eq!(from_tracing(&Level::DEBUG), LogLevel::Debug);
        assert_eq!(from_tracing(&Level::INFO), LogLevel::Info);
        assert_eq!(from_tracing(&Level::WARN), LogLevel::Warn);
        assert_eq!(from_tracing(&Level::ERROR), LogLevel::Error);
    }
}
