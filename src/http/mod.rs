//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/instrument.rs (timer starts, body wrapped)
//!     → handlers.rs (/, /slow, /metrics, fallback)
//!     → response body streamed to client
//!     → middleware/instrument.rs (completion: metrics + log event)
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use middleware::{InstrumentLayer, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
