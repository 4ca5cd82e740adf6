//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! demo-server.toml (optional, working directory)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to HttpServer and the observability stack at startup
//! ```
//!
//! # Design Decisions
//! - Config is static: read once at process start, never reloaded
//! - All fields have defaults to allow minimal or absent files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError, DEFAULT_CONFIG_FILE};
pub use schema::{
    ListenerConfig, LogFormat, LoggingConfig, LokiConfig, MetricsConfig, ServiceConfig,
    SlowRouteConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
