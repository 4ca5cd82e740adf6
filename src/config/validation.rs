//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buckets, probabilities, delays)
//! - Validate addresses and URLs before any socket is opened
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("metrics.request_buckets must not be empty")]
    EmptyBuckets,

    #[error("metrics.request_buckets must be positive, finite and strictly increasing")]
    UnorderedBuckets,

    #[error("slow_route delay range {min}..{max} ms is empty")]
    DelayRange { min: u64, max: u64 },

    #[error("slow_route.error_probability {0} is outside [0, 1]")]
    Probability(f64),

    #[error("logging.loki.url `{0}` is not a valid URL")]
    LokiUrl(String),

    #[error("logging.loki.{0} must be greater than zero")]
    LokiZero(&'static str),

    #[error("timeouts.request_secs must be greater than zero when set")]
    RequestTimeout,
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let buckets = &config.metrics.request_buckets;
    if buckets.is_empty() {
        errors.push(ValidationError::EmptyBuckets);
    } else if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0)
        || buckets.windows(2).any(|w| w[0] >= w[1])
    {
        errors.push(ValidationError::UnorderedBuckets);
    }

    let slow = &config.slow_route;
    if slow.min_delay_ms >= slow.max_delay_ms {
        errors.push(ValidationError::DelayRange {
            min: slow.min_delay_ms,
            max: slow.max_delay_ms,
        });
    }
    if !(0.0..=1.0).contains(&slow.error_probability) {
        errors.push(ValidationError::Probability(slow.error_probability));
    }

    let loki = &config.logging.loki;
    if loki.enabled {
        if url::Url::parse(&loki.url).is_err() {
            errors.push(ValidationError::LokiUrl(loki.url.clone()));
        }
        if loki.batch_size == 0 {
            errors.push(ValidationError::LokiZero("batch_size"));
        }
        if loki.queue_capacity == 0 {
            errors.push(ValidationError::LokiZero("queue_capacity"));
        }
        if loki.max_attempts == 0 {
            errors.push(ValidationError::LokiZero("max_attempts"));
        }
        if loki.flush_interval_ms == 0 {
            errors.push(ValidationError::LokiZero("flush_interval_ms"));
        }
    }

    if config.timeouts.request_secs == Some(0) {
        errors.push(ValidationError::RequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
