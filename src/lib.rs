//! Blockchain event listener service.
//!
//! Watches on-chain log filters (token `Transfer` and `Approval` events) and
//! hands every matching log to a downstream callback. It includes:
//!
//! - Chunked block scanning with retry and backoff against unreliable RPC providers
//! - A bounded, backpressure-aware buffer between scanning and delivery
//! - Durable checkpoints so active listeners survive restarts
//!
//! # Module Structure
//!
//! - `bootstrap`: Builds the service from its configuration
//! - `models`: Listener, event, request and configuration types
//! - `services`: Chain reader, checkpoint store, callbacks, listener pipeline and request queue
//! - `utils`: Logging, metrics, HTTP and parsing helpers

pub mod bootstrap;
pub mod models;
pub mod services;
pub mod utils;
