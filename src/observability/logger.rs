//! Structured application events and their sinks.
//!
//! # Responsibilities
//! - Model leveled events with scalar fields ([`LogEvent`])
//! - Fan each event out to every configured [`LogSink`]
//! - Keep sink failures away from callers
//!
//! # Design Decisions
//! - Sinks accept synchronously and must not block; remote sinks enqueue
//! - A sink error is reported once on the console through `tracing`
//! - The console sink is a bridge into the `tracing` subscriber, so console
//!   formatting (JSON or pretty) is owned by `observability::logging`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

/// Target used for events bridged into `tracing` by [`ConsoleSink`].
pub const EVENTS_TARGET: &str = "demo_server::events";

/// Severity of an application event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar event field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::UInt(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Ordered event fields.
pub type Fields = BTreeMap<String, FieldValue>;

/// Build [`Fields`] from literal pairs.
pub fn fields<const N: usize>(pairs: [(&str, FieldValue); N]) -> Fields {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// One structured application event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub fields: Fields,
    /// Wall-clock time of creation, nanoseconds since the Unix epoch.
    #[serde(skip)]
    pub timestamp_nanos: u128,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        Self {
            level,
            message: message.into(),
            fields: Fields::new(),
            timestamp_nanos,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Flat JSON line: `{"level": .., "message": .., <fields>}`.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::Map::new();
        for (key, value) in &self.fields {
            line.insert(key.clone(), serde_json::to_value(value)?);
        }
        line.insert("level".into(), self.level.as_str().into());
        line.insert("message".into(), self.message.clone().into());
        serde_json::to_string(&line)
    }
}

/// Errors a sink may report for a single event.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink queue is full")]
    QueueFull,

    #[error("sink is closed")]
    Closed,

    #[error("event rejected: {0}")]
    Rejected(String),
}

/// A destination for log events.
pub trait LogSink: Send + Sync {
    /// Short name used when reporting failures.
    fn name(&self) -> &'static str;

    /// Take ownership of a copy of the event. Must not block.
    fn accept(&self, event: &LogEvent) -> Result<(), SinkError>;
}

/// Fans events out to every configured sink.
#[derive(Clone, Default)]
pub struct Logger {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, fields: Fields) {
        self.emit(LogEvent::new(level, message).with_fields(fields));
    }

    pub fn info(&self, message: impl Into<String>, fields: Fields) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Fields) {
        self.log(LogLevel::Error, message, fields);
    }

    /// Hand a prepared event to every sink. Never fails.
    pub fn emit(&self, event: LogEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.accept(&event) {
                tracing::warn!(
                    sink = sink.name(),
                    error = %e,
                    message = %event.message,
                    "Log sink dropped event"
                );
            }
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("Logger").field("sinks", &names).finish()
    }
}

/// Writes events to the console through the `tracing` subscriber.
///
/// Known keys are recorded as typed `tracing` fields, so the JSON formatter
/// emits them as top-level values. Any other keys are collected into `extra`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

/// Field keys with a dedicated `tracing` field.
const CONSOLE_KEYS: [&str; 9] = [
    "method",
    "route",
    "path",
    "status",
    "duration_ms",
    "termination",
    "request_id",
    "delay",
    "port",
];

/// Typed view of an event's fields for the `tracing` macros.
struct ConsoleFields<'a> {
    method: Option<&'a str>,
    route: Option<&'a str>,
    path: Option<&'a str>,
    status: Option<u64>,
    duration_ms: Option<f64>,
    termination: Option<&'a str>,
    request_id: Option<&'a str>,
    delay: Option<u64>,
    port: Option<u64>,
    extra: Option<String>,
}

impl<'a> ConsoleFields<'a> {
    fn new(fields: &'a Fields) -> Result<Self, serde_json::Error> {
        let rest: Fields = fields
            .iter()
            .filter(|(key, _)| !CONSOLE_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let extra = if rest.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&rest)?)
        };

        Ok(Self {
            method: text(fields, "method"),
            route: text(fields, "route"),
            path: text(fields, "path"),
            status: count(fields, "status"),
            duration_ms: float(fields, "duration_ms"),
            termination: text(fields, "termination"),
            request_id: text(fields, "request_id"),
            delay: count(fields, "delay"),
            port: count(fields, "port"),
            extra,
        })
    }
}

fn text<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    match fields.get(key) {
        Some(FieldValue::Str(value)) => Some(value.as_str()),
        _ => None,
    }
}

fn count(fields: &Fields, key: &str) -> Option<u64> {
    match fields.get(key) {
        Some(FieldValue::UInt(value)) => Some(*value),
        Some(FieldValue::Int(value)) => u64::try_from(*value).ok(),
        _ => None,
    }
}

fn float(fields: &Fields, key: &str) -> Option<f64> {
    match fields.get(key) {
        Some(FieldValue::Float(value)) => Some(*value),
        Some(FieldValue::UInt(value)) => Some(*value as f64),
        Some(FieldValue::Int(value)) => Some(*value as f64),
        _ => None,
    }
}

macro_rules! console_event {
    ($level:ident, $fields:expr, $message:expr) => {{
        let f = $fields;
        tracing::$level!(
            target: EVENTS_TARGET,
            method = f.method,
            route = f.route,
            path = f.path,
            status = f.status,
            duration_ms = f.duration_ms,
            termination = f.termination,
            request_id = f.request_id,
            delay = f.delay,
            port = f.port,
            extra = f.extra.as_deref(),
            "{}",
            $message
        )
    }};
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn accept(&self, event: &LogEvent) -> Result<(), SinkError> {
        let fields =
            ConsoleFields::new(&event.fields).map_err(|e| SinkError::Rejected(e.to_string()))?;

        match event.level {
            LogLevel::Info => console_event!(info, &fields, event.message),
            LogLevel::Error => console_event!(error, &fields, event.message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<LogEvent>>);

    impl LogSink for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        fn accept(&self, event: &LogEvent) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Broken;

    impl LogSink for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn accept(&self, _event: &LogEvent) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }
    }

    #[test]
    fn every_sink_receives_the_event() {
        let first = Arc::new(Capture::default());
        let second = Arc::new(Capture::default());
        let logger = Logger::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        logger.info("Root route called", Fields::new());

        assert_eq!(first.0.lock().unwrap().len(), 1);
        assert_eq!(second.0.lock().unwrap()[0].message, "Root route called");
    }

    #[test]
    fn failing_sink_does_not_starve_the_others() {
        let capture = Arc::new(Capture::default());
        let logger = Logger::new()
            .with_sink(Arc::new(Broken))
            .with_sink(capture.clone());

        logger.error("boom", fields([("delay", 42u64.into())]));

        let events = capture.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, LogLevel::Error);
        assert_eq!(events[0].fields.get("delay"), Some(&FieldValue::UInt(42)));
    }

    #[test]
    fn json_line_is_flat() {
        let event = LogEvent::new(LogLevel::Info, "Slow route responded").with_field("delay", 120u64);
        let line: serde_json::Value = serde_json::from_str(&event.to_json_line().unwrap()).unwrap();

        assert_eq!(line["level"], "info");
        assert_eq!(line["message"], "Slow route responded");
        assert_eq!(line["delay"], 120);
    }

    /// Writer collecting subscriber output for assertions.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn console_json(event: &LogEvent) -> serde_json::Value {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || ConsoleSink.accept(event).unwrap());

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        serde_json::from_str(output.trim()).unwrap()
    }

    #[test]
    fn console_output_has_typed_top_level_fields() {
        let event = LogEvent::new(LogLevel::Error, "HTTP Request")
            .with_field("method", "GET")
            .with_field("route", "/slow")
            .with_field("status", 500u16)
            .with_field("duration_ms", 12.5);
        let line = console_json(&event);

        assert_eq!(line["message"], "HTTP Request");
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["target"], EVENTS_TARGET);
        assert_eq!(line["method"], "GET");
        assert_eq!(line["route"], "/slow");
        assert_eq!(line["status"], 500);
        assert_eq!(line["duration_ms"], 12.5);
        assert!(line.get("fields").is_none());
        assert!(line.get("extra").is_none());
        assert!(line.get("request_id").is_none());
    }

    #[test]
    fn unknown_console_keys_go_to_extra() {
        let event = LogEvent::new(LogLevel::Info, "custom").with_field("user", "ana");
        let line = console_json(&event);

        let extra: serde_json::Value = serde_json::from_str(line["extra"].as_str().unwrap()).unwrap();
        assert_eq!(extra["user"], "ana");
    }

    #[test]
    fn console_sink_accepts_all_levels() {
        let sink = ConsoleSink;
        assert!(sink.accept(&LogEvent::new(LogLevel::Info, "hello")).is_ok());
        assert!(sink.accept(&LogEvent::new(LogLevel::Error, "oops")).is_ok());
    }

    #[test]
    fn timestamps_are_wall_clock() {
        let event = LogEvent::new(LogLevel::Info, "now");
        // 2020-01-01T00:00:00Z
        assert!(event.timestamp_nanos > 1_577_836_800_000_000_000);
    }
}
