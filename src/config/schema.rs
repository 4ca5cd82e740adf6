//! Configuration schema definitions.
//!
//! All types derive Serde traits so a `demo-server.toml` file can override any
//! subset of the defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default histogram boundaries for request latency, in seconds.
pub const DEFAULT_REQUEST_BUCKETS: [f64; 6] = [0.01, 0.1, 0.5, 1.0, 2.5, 5.0];

/// Root configuration for the demo server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Metrics registry settings.
    pub metrics: MetricsConfig,

    /// Structured logging and log shipping.
    pub logging: LoggingConfig,

    /// Behavior of the synthetic `/slow` route.
    pub slow_route: SlowRouteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Metrics registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Bucket boundaries for `http_request_duration_seconds`.
    pub request_buckets: Vec<f64>,

    /// Collect baseline process metrics (CPU, memory, fds, threads).
    pub process_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            request_buckets: DEFAULT_REQUEST_BUCKETS.to_vec(),
            process_metrics: true,
        }
    }
}

/// Console output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Console output format.
    pub format: LogFormat,

    /// Emit structured events to the console.
    pub console: bool,

    /// Remote Loki sink.
    pub loki: LokiConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            console: true,
            loki: LokiConfig::default(),
        }
    }
}

/// Loki push configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LokiConfig {
    /// Enable shipping to Loki.
    pub enabled: bool,

    /// Base URL of the Loki service.
    pub url: String,

    /// Static stream labels attached to every pushed event.
    pub labels: BTreeMap<String, String>,

    /// Flush once this many events are buffered.
    pub batch_size: usize,

    /// Flush at least this often while events are buffered.
    pub flush_interval_ms: u64,

    /// Capacity of the queue between the logger and the shipper.
    pub queue_capacity: usize,

    /// Push attempts per batch before it is dropped.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Per-push HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LokiConfig {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "node-app".to_string());

        Self {
            enabled: true,
            url: "http://loki:3100".to_string(),
            labels,
            batch_size: 100,
            flush_interval_ms: 1000,
            queue_capacity: 1024,
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            timeout_secs: 5,
        }
    }
}

/// Synthetic latency and failure injection for `/slow`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SlowRouteConfig {
    /// Smallest delay, inclusive.
    pub min_delay_ms: u64,

    /// Largest delay, exclusive.
    pub max_delay_ms: u64,

    /// Probability in [0, 1] that the route answers with a 500.
    pub error_probability: f64,
}

impl Default for SlowRouteConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 2510,
            error_probability: 0.2,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total request timeout in seconds. Unbounded when unset.
    pub request_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_static_deployment() {
        let config = ServiceConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.logging.loki.url, "http://loki:3100");
        assert_eq!(
            config.logging.loki.labels.get("app").map(String::as_str),
            Some("node-app")
        );
        assert_eq!(config.metrics.request_buckets, DEFAULT_REQUEST_BUCKETS.to_vec());
        assert!(config.timeouts.request_secs.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [slow_route]
            error_probability = 0.0

            [logging]
            format = "pretty"

            [logging.loki]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.slow_route.error_probability, 0.0);
        assert_eq!(config.slow_route.min_delay_ms, 10);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.logging.loki.enabled);
        assert_eq!(config.logging.loki.batch_size, 100);
    }
}
