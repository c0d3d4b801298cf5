//! Logger engines.
//!
//! Application code logs through [`Context::log`](crate::dispatch::Context::log);
//! the configured backend decides where messages go. Every message first runs
//! the `engine.logger.before` hook, which may rewrite it.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dispatch::Flow;
use crate::error::{Error, Result};
use crate::hooks::{AsHookable, HookArgs, HookTable, HookType, Hookable};

pub const BEFORE: &str = "engine.logger.before";

/// Message severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Core,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Core => "core",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(LogLevel::Core),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::msg(format!("unknown log level `{other}`"))),
        }
    }
}

/// A logger backend.
pub trait LoggerEngine: Hookable + AsHookable {
    /// Messages below this level are dropped before hooks run.
    fn min_level(&self) -> LogLevel;

    /// Emit an already-filtered, already-hooked message.
    fn write(&self, level: LogLevel, message: &str);

    fn log(&self, level: LogLevel, message: &str) -> Flow<()> {
        if level < self.min_level() {
            return Ok(());
        }
        let mut message = message.to_string();
        self.execute_hook(
            BEFORE,
            &mut HookArgs::Log {
                level,
                message: &mut message,
            },
        )?;
        self.write(level, &message);
        Ok(())
    }
}

/// Closed set of logger variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerBackend {
    Tracing,
    Capture,
    Null,
}

impl LoggerBackend {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match super::normalize_tag(tag).as_str() {
            "tracing" | "console" => Some(LoggerBackend::Tracing),
            "capture" => Some(LoggerBackend::Capture),
            "null" => Some(LoggerBackend::Null),
            _ => None,
        }
    }

    pub fn build(self, options: &Map<String, Value>, app_name: &str) -> Result<Arc<dyn LoggerEngine>> {
        let min_level = match options.get("log_level").and_then(Value::as_str) {
            Some(level) => level.parse()?,
            None => LogLevel::Debug,
        };
        Ok(match self {
            LoggerBackend::Tracing => Arc::new(TracingLogger::new(app_name, min_level)),
            LoggerBackend::Capture => Arc::new(CaptureLogger::new(min_level)),
            LoggerBackend::Null => Arc::new(NullLogger::new()),
        })
    }
}

fn logger_table() -> HookTable {
    HookTable::new([BEFORE])
}

/// Forwards application messages to `tracing` events.
pub struct TracingLogger {
    app: String,
    min_level: LogLevel,
    hooks: HookTable,
}

impl TracingLogger {
    pub fn new(app: impl Into<String>, min_level: LogLevel) -> Self {
        Self {
            app: app.into(),
            min_level,
            hooks: logger_table(),
        }
    }
}

impl Hookable for TracingLogger {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "logger"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl LoggerEngine for TracingLogger {
    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Core => tracing::trace!(app = %self.app, "{message}"),
            LogLevel::Debug => tracing::debug!(app = %self.app, "{message}"),
            LogLevel::Info => tracing::info!(app = %self.app, "{message}"),
            LogLevel::Warning => tracing::warn!(app = %self.app, "{message}"),
            LogLevel::Error => tracing::error!(app = %self.app, "{message}"),
        }
    }
}

/// Keeps messages in memory; handy for tests and debugging pages.
pub struct CaptureLogger {
    min_level: LogLevel,
    entries: Mutex<Vec<(LogLevel, String)>>,
    hooks: HookTable,
}

impl CaptureLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            entries: Mutex::new(Vec::new()),
            hooks: logger_table(),
        }
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().clone()
    }
}

impl Hookable for CaptureLogger {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "logger"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl LoggerEngine for CaptureLogger {
    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, level: LogLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

/// Drops everything.
pub struct NullLogger {
    hooks: HookTable,
}

impl NullLogger {
    pub fn new() -> Self {
        Self {
            hooks: logger_table(),
        }
    }
}

impl Default for NullLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Hookable for NullLogger {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "logger"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl LoggerEngine for NullLogger {
    fn min_level(&self) -> LogLevel {
        LogLevel::Error
    }

    fn write(&self, _level: LogLevel, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let logger = CaptureLogger::new(LogLevel::Info);
        logger.log(LogLevel::Debug, "hidden").unwrap();
        logger.log(LogLevel::Warning, "shown").unwrap();
        assert_eq!(logger.entries(), vec![(LogLevel::Warning, "shown".to_string())]);
    }

    #[test]
    fn test_before_hook_rewrites_message() {
        let logger = CaptureLogger::new(LogLevel::Core);
        logger.hook_table().register(
            BEFORE,
            Arc::new(|args| {
                if let Some(message) = args.content() {
                    message.insert_str(0, "[app] ");
                }
                Ok(())
            }),
        );
        logger.log(LogLevel::Info, "started").unwrap();
        assert_eq!(logger.entries()[0].1, "[app] started");
    }

    #[test]
    fn test_backend_tags() {
        assert_eq!(LoggerBackend::from_tag("Capture"), Some(LoggerBackend::Capture));
        assert_eq!(LoggerBackend::from_tag("file"), None);
        assert!("warn".parse::<LogLevel>().is_ok());
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
