//! Demo HTTP service with request metrics and structured log shipping.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Application, Shutdown};
pub use observability::{Logger, MetricsRegistry};
