//! Utility modules shared across the crate.
//!
//! - http: retryable HTTP client creation
//! - logging: tracing setup and structured error context
//! - metrics: Prometheus registry and metrics server
//! - parsing: size and hex parsing helpers
//! - tests: builders for test fixtures

pub mod http;
pub mod logging;
pub mod metrics;
pub mod parsing;

pub use http::*;
pub use parsing::*;
