//! Structured logging setup.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber (console output)
//! - Assemble the application [`Logger`] with its configured sinks
//!
//! # Design Decisions
//! - JSON format by default for machine parsing, pretty format for development
//! - `RUST_LOG` overrides the configured level

use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::observability::logger::{ConsoleSink, Logger};
use crate::observability::loki::{LokiError, LokiShipper};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> String {
    format!("demo_server={level},tower_http={level}")
}

/// Install the global `tracing` subscriber.
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&config.level).into());

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json().flatten_event(true)), None),
        LogFormat::Pretty => (None, Some(fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
}

/// Build the application logger.
///
/// When Loki is enabled the returned shipper must be spawned; until it runs,
/// events accumulate in its queue.
pub fn build_logger(config: &LoggingConfig) -> Result<(Logger, Option<LokiShipper>), LokiError> {
    let mut logger = Logger::new();

    if config.console {
        logger = logger.with_sink(Arc::new(ConsoleSink));
    }

    let shipper = if config.loki.enabled {
        let (sink, shipper) = LokiShipper::new(&config.loki)?;
        logger = logger.with_sink(Arc::new(sink));
        Some(shipper)
    } else {
        None
    };

    Ok((logger, shipper))
}
