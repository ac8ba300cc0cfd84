//! Listener lifecycle error types.
//!
//! Covers registry conflicts, invalid creation requests, persistence failures
//! and provider failures that end a listener.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Errors surfaced by the listener manager and its scanners
#[derive(ThisError, Debug)]
pub enum ListenerError {
	/// A listener with the same id is active or being created
	#[error("Listener already exists: {0}")]
	AlreadyExists(ErrorContext),

	/// No listener or persisted record with that id
	#[error("Listener not found: {0}")]
	NotFound(ErrorContext),

	/// The creation request or stored configuration is invalid
	#[error("Invalid request: {0}")]
	InvalidRequest(ErrorContext),

	/// Reading or writing the checkpoint store failed
	#[error("Persistence error: {0}")]
	PersistenceError(ErrorContext),

	/// The chain reader failed in a way retries cannot fix
	#[error("Unrecoverable provider error: {0}")]
	Unrecoverable(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl ListenerError {
	// Callers race on creation routinely, not worth an error log
	pub fn already_exists(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::AlreadyExists(ErrorContext::new(msg, source, metadata))
	}

	pub fn not_found(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NotFound(ErrorContext::new(msg, source, metadata))
	}

	pub fn invalid_request(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::InvalidRequest(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn persistence_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::PersistenceError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn unrecoverable(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Unrecoverable(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for ListenerError {
	fn trace_id(&self) -> String {
		match self {
			Self::AlreadyExists(ctx)
			| Self::NotFound(ctx)
			| Self::InvalidRequest(ctx)
			| Self::PersistenceError(ctx)
			| Self::Unrecoverable(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
