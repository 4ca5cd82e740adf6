//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own the Prometheus recorder for the process (constructed once at startup)
//! - Count requests and record their latency by (method, route, status_code)
//! - Refresh baseline process and runtime metrics on every scrape
//! - Render the Prometheus text exposition format
//!
//! # Metrics
//! - `http_requests_total` (counter): completed requests by method, route, status_code
//! - `http_request_duration_seconds` (histogram): latency distribution, same labels
//! - `process_*` (gauges/counters): CPU, memory, fds, threads, start time
//! - `tokio_runtime_workers`, `tokio_runtime_alive_tasks` (gauges)
//!
//! # Design Decisions
//! - No global recorder: the registry is passed explicitly (`Arc<MetricsRegistry>`)
//! - Low-overhead metric updates (atomic operations inside the exporter)
//! - Unmatched requests keep their raw path as `route`; cardinality is unbounded
//!   for arbitrary paths, a known limitation of this labelling scheme

use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use thiserror::Error;

use crate::config::MetricsConfig;
use crate::observability::recorder::RequestObservation;

/// Counter of completed requests.
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Histogram of request latency in seconds.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Content type of [`MetricsRegistry::render`] output.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Errors raised by the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to build Prometheus recorder: {0}")]
    Build(#[from] BuildError),

    #[error("rejected observation {value} for `{name}`")]
    InvalidObservation { name: &'static str, value: f64 },
}

/// Label-tuple identifying one request series cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestLabels {
    pub method: String,
    pub route: String,
    pub status_code: u16,
}

impl RequestLabels {
    pub fn new(method: &str, route: &str, status_code: u16) -> Self {
        Self {
            method: method.to_string(),
            route: route.to_string(),
            status_code,
        }
    }

    fn to_labels(&self) -> Vec<Label> {
        vec![
            Label::new("method", self.method.clone()),
            Label::new("route", self.route.clone()),
            Label::new("status_code", self.status_code.to_string()),
        ]
    }
}

/// Process-wide registry of request counters and histograms.
pub struct MetricsRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    process: Option<metrics_process::Collector>,
}

impl MetricsRegistry {
    /// Build the registry with the configured latency buckets.
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
                &config.request_buckets,
            )?
            .build_recorder();
        let handle = recorder.handle();

        recorder.describe_counter(
            HTTP_REQUESTS_TOTAL.into(),
            None,
            "Total number of HTTP requests".into(),
        );
        recorder.describe_histogram(
            HTTP_REQUEST_DURATION_SECONDS.into(),
            None,
            "Duration of HTTP requests in seconds".into(),
        );

        let process = config.process_metrics.then(|| {
            metrics::with_local_recorder(&recorder, || {
                let collector = metrics_process::Collector::default();
                collector.describe();
                collector
            })
        });

        let registry = Self {
            recorder,
            handle,
            process,
        };
        // Baseline series exist from startup, before the first scrape.
        registry.refresh_baseline();

        tracing::debug!(
            buckets = ?config.request_buckets,
            process_metrics = config.process_metrics,
            "Metrics registry initialized"
        );

        Ok(registry)
    }

    /// Add one to the counter `name` for the label-tuple.
    pub fn increment_counter(&self, name: &'static str, labels: &RequestLabels) {
        let key = Key::from_parts(name, labels.to_labels());
        self.recorder.register_counter(&key, &METADATA).increment(1);
    }

    /// Record one histogram observation for the label-tuple.
    pub fn observe_histogram(
        &self,
        name: &'static str,
        labels: &RequestLabels,
        value: f64,
    ) -> Result<(), MetricsError> {
        if !value.is_finite() || value < 0.0 {
            return Err(MetricsError::InvalidObservation { name, value });
        }

        let key = Key::from_parts(name, labels.to_labels());
        self.recorder.register_histogram(&key, &METADATA).record(value);
        Ok(())
    }

    /// Count a completed request and record its latency.
    pub fn record_request(&self, observation: &RequestObservation) -> Result<(), MetricsError> {
        let labels = observation.labels();
        self.increment_counter(HTTP_REQUESTS_TOTAL, &labels);
        self.observe_histogram(
            HTTP_REQUEST_DURATION_SECONDS,
            &labels,
            observation.duration_seconds,
        )
    }

    /// Render every registered series in the Prometheus text format.
    pub fn render(&self) -> String {
        self.refresh_baseline();
        self.handle.render()
    }

    fn refresh_baseline(&self) {
        if let Some(process) = &self.process {
            metrics::with_local_recorder(&self.recorder, || process.collect());
        }

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let runtime_metrics = runtime.metrics();
            self.set_gauge("tokio_runtime_workers", runtime_metrics.num_workers() as f64);
            self.set_gauge(
                "tokio_runtime_alive_tasks",
                runtime_metrics.num_alive_tasks() as f64,
            );
        }
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        self.recorder
            .register_gauge(&Key::from_name(name), &METADATA)
            .set(value);
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("process_metrics", &self.process.is_some())
            .finish()
    }
}
