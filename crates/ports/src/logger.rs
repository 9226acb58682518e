//! Structured logging boundary contract.

use std::collections::BTreeMap;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug.
    Debug,
    /// Info.
    Info,
    /// Warn.
    Warn,
    /// Error.
    Error,
}

/// Additional event fields.
pub type LogFields = BTreeMap<Box<str>, serde_json::Value>;

/// Structured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Stable dotted event name, e.g. `index.scan.dir_unreadable`.
    pub event: Box<str>,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: Box<str>,
    /// Optional structured fields.
    pub fields: Option<LogFields>,
}

/// Boundary contract for structured logging.
pub trait LoggerPort: Send + Sync {
    /// Emit a structured event.
    fn log(&self, event: LogEvent);

    /// Create a child logger with base fields applied to every event.
    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort>;

    /// Debug event.
    fn debug(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(build(LogLevel::Debug, event, message, fields));
    }

    /// Info event.
    fn info(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(build(LogLevel::Info, event, message, fields));
    }

    /// Warn event.
    fn warn(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(build(LogLevel::Warn, event, message, fields));
    }

    /// Error event.
    fn error(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(build(LogLevel::Error, event, message, fields));
    }
}

fn build(level: LogLevel, event: &str, message: &str, fields: Option<LogFields>) -> LogEvent {
    LogEvent {
        event: Box::from(event),
        level,
        message: Box::from(message),
        fields,
    }
}

/// Build a [`LogFields`] map from `key => value` pairs.
///
/// ```
/// let fields = code_index_ports::log_fields! { "file" => "src/lib.rs", "blocks" => 3 };
/// assert_eq!(fields.len(), 2);
/// ```
#[macro_export]
macro_rules! log_fields {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut fields = $crate::LogFields::new();
        $(fields.insert(::std::boxed::Box::<str>::from($key), $crate::serde_json::json!($value));)*
        fields
    }};
}
