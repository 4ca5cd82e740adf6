//! Tower middleware applied to every route.

pub mod instrument;

pub use instrument::{InstrumentLayer, InstrumentService, InstrumentedBody, CLIENT_CLOSED_REQUEST, X_REQUEST_ID};
