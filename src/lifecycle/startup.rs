//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order (registry → logger → server)
//! - Bind the listener
//! - Start the Loki shipper and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The shipper stops after the server so the last requests are shipped

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::logging::build_logger;
use crate::observability::{fields, Logger, LokiError, LokiShipper, MetricsError, MetricsRegistry};

/// Errors that abort startup or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Loki(#[from] LokiError),
}

/// A fully initialized, bound, not yet serving application.
pub struct Application {
    listener: TcpListener,
    local_addr: SocketAddr,
    server: HttpServer,
    logger: Arc<Logger>,
    shipper: Option<LokiShipper>,
    shutdown: Shutdown,
}

impl Application {
    /// Build every subsystem from configuration and bind the listener.
    pub async fn build(config: &ServiceConfig) -> Result<Self, ServerError> {
        let (logger, shipper) = build_logger(&config.logging)?;
        Self::build_with_logger(config, logger, shipper).await
    }

    /// Like [`Application::build`], with a caller-assembled logger.
    pub async fn build_with_logger(
        config: &ServiceConfig,
        logger: Logger,
        shipper: Option<LokiShipper>,
    ) -> Result<Self, ServerError> {
        let registry = Arc::new(MetricsRegistry::new(&config.metrics)?);
        let logger = Arc::new(logger);

        let server = HttpServer::new(config, registry, logger.clone());

        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "Listening for connections");

        Ok(Self {
            listener,
            local_addr,
            server,
            logger,
            shipper,
            shutdown: Shutdown::new(),
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops the server when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until the shutdown handle fires, then flush queued logs.
    pub async fn run(self) -> Result<(), ServerError> {
        let shipper_stop = Shutdown::new();
        let shipper = self
            .shipper
            .map(|shipper| tokio::spawn(shipper.run(shipper_stop.subscribe())));

        let port = self.local_addr.port();
        self.logger.info(
            format!("Server running at http://localhost:{port}"),
            fields([("port", port.into())]),
        );
        self.logger.info(
            format!("Metrics available at http://localhost:{port}/metrics"),
            fields([("port", port.into())]),
        );

        let served = self.server.run(self.listener, self.shutdown.subscribe()).await;

        shipper_stop.trigger();
        if let Some(handle) = shipper {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Loki shipper task failed");
            }
        }

        served?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
