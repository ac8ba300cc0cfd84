//! Callback error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;

/// Errors raised while delivering an event downstream
#[derive(ThisError, Debug)]
pub enum CallbackError {
	/// The request could not be sent
	#[error("Network error: {0}")]
	NetworkError(Box<ErrorContext>),

	/// The callback target is misconfigured (bad secret, bad header value)
	#[error("Config error: {0}")]
	ConfigError(Box<ErrorContext>),

	/// The downstream consumer rejected the event
	#[error("Delivery failed: {0}")]
	DeliveryFailed(Box<ErrorContext>),

	/// The callback panicked
	#[error("Callback panicked: {0}")]
	Panicked(Box<ErrorContext>),
}

impl CallbackError {
	pub fn network_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NetworkError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn config_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ConfigError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn delivery_failed(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DeliveryFailed(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn panicked(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Panicked(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}
}

impl TraceableError for CallbackError {
	fn trace_id(&self) -> String {
		match self {
			Self::NetworkError(ctx)
			| Self::ConfigError(ctx)
			| Self::DeliveryFailed(ctx)
			| Self::Panicked(ctx) => ctx.trace_id.clone(),
		}
	}
}
