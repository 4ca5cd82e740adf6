//! Demo HTTP service.
//!
//! Serves two toy routes, counts and times every request, and ships one
//! structured log event per request to the console and to Loki.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌──────────────────────────────────────────────┐
//!     ──────────────────▶│ trace → request id → instrument → handlers   │
//!                        │                          │                   │
//!     Client Response    │                          ▼                   │
//!     ◀──────────────────│          MetricsRegistry ◀── completion ──┐  │
//!                        │            (/metrics)                     │  │
//!                        │                                    Logger ┘  │
//!                        │                              ┌──────┴─────┐  │
//!                        │                         console        Loki ─┼──▶ Loki
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::Path;

use demo_server::config::{load_or_default, DEFAULT_CONFIG_FILE};
use demo_server::lifecycle::{shutdown_signal, Application};
use demo_server::observability::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_or_default(Path::new(DEFAULT_CONFIG_FILE))?;
    init_tracing(&config.logging)?;

    tracing::info!("demo-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        loki_enabled = config.logging.loki.enabled,
        request_timeout_secs = ?config.timeouts.request_secs,
        "Configuration loaded"
    );

    let app = Application::build(&config).await?;

    let shutdown = app.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    app.run().await?;
    Ok(())
}
