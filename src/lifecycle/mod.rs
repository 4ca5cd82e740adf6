//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build registry + logger → Bind listener → Spawn shipper → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests
//!     → Flush Loki queue → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Log shipping stops after the server so the last requests are shipped

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{wait_for, Shutdown};
pub use signals::shutdown_signal;
pub use startup::{Application, ServerError};
