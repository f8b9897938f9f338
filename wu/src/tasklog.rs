//! User-facing narrative of what an operation did

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Ordered entries accumulated by one operation
///
/// Each entry is mirrored to tracing as it is pushed. Logs built
/// concurrently (one per project) are combined with [`TaskLog::extend`] in
/// a fixed order so output does not depend on completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaskLog {
    entries: Vec<LogEntry>,
}

impl TaskLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.entries.push(LogEntry {
            level: LogLevel::Info,
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.entries.push(LogEntry {
            level: LogLevel::Warn,
            message,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.entries.push(LogEntry {
            level: LogLevel::Error,
            message,
        });
    }

    /// Append another log's entries without re-emitting them to tracing
    pub fn extend(&mut self, other: TaskLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Error)
    }
}

impl fmt::Display for TaskLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match entry.level {
                LogLevel::Info => writeln!(f, "{}", entry.message)?,
                LogLevel::Warn => writeln!(f, "{} {}", "warning:".yellow().bold(), entry.message)?,
                LogLevel::Error => writeln!(f, "{} {}", "ERROR:".red().bold(), entry.message)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_in_push_order() {
        let mut log = TaskLog::new();
        log.info("one");
        log.warn("two");
        log.error("three");

        let levels: Vec<LogLevel> = log.entries().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]);
        assert!(log.has_errors());
    }

    #[test]
    fn test_extend_preserves_order() {
        let mut a = TaskLog::new();
        a.info("a");
        let mut b = TaskLog::new();
        b.info("b");

        let mut combined = TaskLog::new();
        combined.extend(b);
        combined.extend(a);
        let messages: Vec<&str> = combined.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "a"]);
    }

    #[test]
    fn test_error_entries_are_marked() {
        colored::control::set_override(false);
        let mut log = TaskLog::new();
        log.error("fetch failed");
        assert_eq!(log.to_string(), "ERROR: fetch failed\n");
    }
}
