//! Mock implementations for testing purposes.
//!
//! This module contains mock implementations of the service traits used by the
//! listener pipeline, primarily for testing. It includes mocks for:
//! - The chain reader
//! - The checkpoint store
//! - The event callback
//! - The request handler of the request queue
//!
//! The mocks are implemented using the `mockall` crate.

mod models;
mod services;
#[allow(unused_imports)]
pub use models::*;
#[allow(unused_imports)]
pub use services::*;
