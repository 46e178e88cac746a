//! Tower middleware for the HTTP client.
//!
//! Layers compose through [`HyperClientBuilder::layer`](crate::HyperClientBuilder::layer).

mod logging;

pub use logging::{LogLevel, Logging, LoggingLayer, WIRE_TARGET};
