//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Push to Loki fails:
//!     → backoff.rs (exponential delay with jitter)
//!     → retry until the attempt budget is spent, then drop the batch
//! ```
//!
//! # Design Decisions
//! - Only outbound log shipping retries; HTTP requests are never retried
//! - Jitter spreads retries from many instances

pub mod backoff;

pub use backoff::{calculate_backoff, BackoffPolicy};
