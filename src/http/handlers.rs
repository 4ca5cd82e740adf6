//! Route handlers.
//!
//! # Routes
//! - `GET /` → `Hello`
//! - `GET /slow` → waits a random delay, then succeeds or fails at random
//! - `GET /metrics` → Prometheus text exposition
//! - anything else → 404 `Cannot {METHOD} {path}`

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::IntoResponse,
};
use rand::Rng;

use crate::config::SlowRouteConfig;
use crate::http::server::AppState;
use crate::observability::{fields, metrics::EXPOSITION_CONTENT_TYPE, Fields};

/// `GET /`
pub async fn root(State(state): State<AppState>) -> &'static str {
    state.logger.info("Root route called", Fields::new());
    "Hello"
}

/// What `/slow` will do for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlowOutcome {
    pub delay_ms: u64,
    pub fail: bool,
}

impl SlowOutcome {
    /// Draw a delay in `[min_delay_ms, max_delay_ms)` and the failure coin.
    pub fn roll<R: Rng + ?Sized>(config: &SlowRouteConfig, rng: &mut R) -> Self {
        let delay_ms = rng.gen_range(config.min_delay_ms..config.max_delay_ms);
        let fail = rng.gen_bool(config.error_probability);
        Self { delay_ms, fail }
    }
}

/// `GET /slow`
pub async fn slow(State(state): State<AppState>) -> impl IntoResponse {
    // ThreadRng is not Send; draw before suspending.
    let outcome = SlowOutcome::roll(&state.slow, &mut rand::thread_rng());

    tokio::time::sleep(Duration::from_millis(outcome.delay_ms)).await;

    let delay = fields([("delay", outcome.delay_ms.into())]);
    if outcome.fail {
        state.logger.error("Internal Server Error on /slow route", delay);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
    } else {
        state.logger.info("Slow route responded", delay);
        (
            StatusCode::OK,
            format!("Responded after {}ms", outcome.delay_ms),
        )
    }
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.registry.render(),
    )
}

/// Fallback for unmatched requests.
pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        format!("Cannot {} {}", method, uri.path()),
    )
}
