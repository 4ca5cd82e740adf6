//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Instrumentation layer (per request):
//!     → recorder.rs (RequestTimer → RequestObservation)
//!     → metrics.rs (counter + histogram, rendered on /metrics)
//!     → logger.rs (one "HTTP Request" event, fanned out to sinks)
//!
//! Sinks:
//!     → ConsoleSink → logging.rs subscriber (stdout, JSON or pretty)
//!     → LokiSink → loki.rs shipper (batched push, retries)
//! ```
//!
//! # Design Decisions
//! - Metrics and logging are independent; one failing never blocks the other
//! - The registry is constructed once and injected, never global
//! - Metrics are cheap (atomic increments)

pub mod logger;
pub mod logging;
pub mod loki;
pub mod metrics;
pub mod recorder;

#[cfg(test)]
pub(crate) mod testing;

pub use logger::{fields, ConsoleSink, FieldValue, Fields, LogEvent, LogLevel, LogSink, Logger, SinkError};
pub use loki::{LokiError, LokiShipper, LokiSink};
pub use metrics::{MetricsError, MetricsRegistry, RequestLabels};
pub use recorder::{RequestObservation, RequestTimer, Termination};
