//! Per-request timing.
//!
//! A [`RequestTimer`] is started when a request enters the instrumentation
//! layer and consumed exactly once when the response terminates, yielding an
//! immutable [`RequestObservation`].

use std::fmt;
use std::time::Instant;

use crate::observability::logger::{LogEvent, LogLevel};
use crate::observability::metrics::RequestLabels;

/// How the response reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Body fully handed to the transport.
    Finished,
    /// Body stream produced an error.
    BodyError,
    /// Body dropped before end of stream (client went away).
    Aborted,
    /// Inner service failed before producing a response.
    ServiceError,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Finished => "finished",
            Termination::BodyError => "body_error",
            Termination::Aborted => "aborted",
            Termination::ServiceError => "service_error",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing handle for a single in-flight request.
///
/// Not `Clone`: completing it consumes the handle, so one request can only
/// ever produce one observation.
#[derive(Debug)]
pub struct RequestTimer {
    start: Instant,
    method: String,
    route: String,
    path: String,
    request_id: Option<String>,
}

impl RequestTimer {
    /// Capture the start instant for a request.
    pub fn start(
        method: impl Into<String>,
        route: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            start: Instant::now(),
            method: method.into(),
            route: route.into(),
            path: path.into(),
            request_id: None,
        }
    }

    /// Attach the correlation ID propagated in `x-request-id`.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Close the timer with the final status.
    pub fn complete(self, status_code: u16, termination: Termination) -> RequestObservation {
        let duration_seconds = self.start.elapsed().as_secs_f64();
        RequestObservation {
            method: self.method,
            route: self.route,
            path: self.path,
            status_code,
            duration_seconds,
            termination,
            request_id: self.request_id,
        }
    }
}

/// A completed request, ready to be recorded and logged.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestObservation {
    pub method: String,
    /// Matched route template, or the raw path when nothing matched.
    pub route: String,
    /// Original URI (path and query) as received.
    pub path: String,
    pub status_code: u16,
    pub duration_seconds: f64,
    pub termination: Termination,
    pub request_id: Option<String>,
}

impl RequestObservation {
    pub fn labels(&self) -> RequestLabels {
        RequestLabels::new(&self.method, &self.route, self.status_code)
    }

    /// Server errors log at `error`, everything else at `info`.
    pub fn log_level(&self) -> LogLevel {
        if self.status_code >= 500 {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }

    /// The `HTTP Request` event emitted for this request.
    pub fn to_log_event(&self) -> LogEvent {
        let event = LogEvent::new(self.log_level(), "HTTP Request")
            .with_field("method", self.method.as_str())
            .with_field("route", self.route.as_str())
            .with_field("path", self.path.as_str())
            .with_field("status", self.status_code)
            .with_field("duration_ms", self.duration_seconds * 1000.0)
            .with_field("termination", self.termination.as_str());

        match &self.request_id {
            Some(id) => event.with_field("request_id", id.as_str()),
            None => event,
        }
    }
}
