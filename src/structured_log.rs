//! Structured diagnostics on stderr
//!
//! Completion requests are short-lived processes whose stdout belongs to the
//! calling shell, so nothing is written unless enabled through
//! [`crate::config::Config`]. Records are JSON lines by default:
//!
//!   {"timestamp":"2024-01-10T12:34:56Z","level":"debug","component":"MACRO","event":"lookup","data":{"call":"$files"}}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref LOGGER: Mutex<Logger> = Mutex::new(Logger::default());
}

/// Threshold and record level; the crate reports failures as diagnostics, so
/// there is nothing above `warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Record<'a> {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    component: &'a str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl Record<'_> {
    /// `[level COMPONENT] event: message {data}`
    fn to_text(&self) -> String {
        let mut line = format!("[{} {}] {}", self.level.as_str(), self.component, self.event);
        if let Some(message) = self.message {
            line.push_str(": ");
            line.push_str(message);
        }
        if let Some(data) = &self.data {
            line.push(' ');
            line.push_str(&data.to_string());
        }
        line
    }

    fn render(&self, json: bool) -> String {
        if json {
            serde_json::to_string(self).unwrap_or_else(|_| self.to_text())
        } else {
            self.to_text()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Nothing is written while disabled
    pub enabled: bool,
    pub json_output: bool,
    /// Appended to in addition to stderr
    pub file_path: Option<PathBuf>,
    pub min_level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            json_output: true,
            file_path: None,
            min_level: LogLevel::Warn,
        }
    }
}

#[derive(Default)]
struct Logger {
    config: LogConfig,
    file: Option<File>,
}

/// Install `config` for the rest of the process
pub fn init_logger(config: LogConfig) {
    let file = config
        .file_path
        .as_ref()
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok());
    if let Ok(mut logger) = LOGGER.lock() {
        *logger = Logger { config, file };
    }
}

#[doc(hidden)]
pub fn record(level: LogLevel, component: &str, event: &str, data: serde_json::Value) {
    write_record(level, component, event, None, Some(data));
}

#[doc(hidden)]
pub fn record_message(
    level: LogLevel,
    component: &str,
    event: &str,
    message: &str,
    data: Option<serde_json::Value>,
) {
    write_record(level, component, event, Some(message), data);
}

fn write_record(
    level: LogLevel,
    component: &str,
    event: &str,
    message: Option<&str>,
    data: Option<serde_json::Value>,
) {
    let Ok(mut logger) = LOGGER.lock() else { return };
    if !logger.config.enabled || level < logger.config.min_level {
        return;
    }

    let line = Record {
        timestamp: Utc::now(),
        level,
        component,
        event,
        message,
        data,
    }
    .render(logger.config.json_output);

    eprintln!("{}", line);
    if let Some(file) = logger.file.as_mut() {
        let _ = writeln!(file, "{}", line);
    }
}

/// Shared body of the level macros: `(component, event, data)` or
/// `(component, event, message, Option<data>)`
#[doc(hidden)]
#[macro_export]
macro_rules! slog_at {
    ($level:ident, $component:expr, $event:expr, $data:expr) => {
        $crate::structured_log::record(
            $crate::structured_log::LogLevel::$level,
            $component,
            $event,
            $data,
        )
    };
    ($level:ident, $component:expr, $event:expr, $msg:expr, $data:expr) => {
        $crate::structured_log::record_message(
            $crate::structured_log::LogLevel::$level,
            $component,
            $event,
            $msg,
            $data,
        )
    };
}

#[macro_export]
macro_rules! slog_debug {
    ($($arg:expr),+ $(,)?) => { $crate::slog_at!(Debug, $($arg),+) };
}

#[macro_export]
macro_rules! slog_info {
    ($($arg:expr),+ $(,)?) => { $crate::slog_at!(Info, $($arg),+) };
}

#[macro_export]
macro_rules! slog_warn {
    ($($arg:expr),+ $(,)?) => { $crate::slog_at!(Warn, $($arg),+) };
}
