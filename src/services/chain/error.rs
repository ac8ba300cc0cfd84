//! Error types for chain access.
//!
//! [`TransportError`] describes what went wrong on the wire; [`ChainReaderError`]
//! is what the scanner sees, classified into transient and unrecoverable kinds.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(Debug, ThisError)]
pub enum TransportError {
	#[error("HTTP error: status {status_code} for URL {url}")]
	Http {
		status_code: reqwest::StatusCode,
		url: String,
		body: String,
		context: ErrorContext,
	},

	#[error("Network error: {0}")]
	Network(ErrorContext),

	#[error("Failed to parse JSON response: {0}")]
	ResponseParse(ErrorContext),

	#[error("Failed to serialize request JSON: {0}")]
	RequestSerialization(ErrorContext),

	#[error("URL rotation failed: {0}")]
	UrlRotation(ErrorContext),
}

impl TransportError {
	// Rate limits are routine; they are logged by the scanner's retry loop instead
	pub fn http(
		status_code: reqwest::StatusCode,
		url: String,
		body: String,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let msg = format!("HTTP error: status {} for URL {}", status_code, url);
		let context = if status_code == reqwest::StatusCode::TOO_MANY_REQUESTS {
			ErrorContext::new(msg, source, metadata)
		} else {
			ErrorContext::new_with_log(msg, source, metadata)
		};

		Self::Http {
			status_code,
			url,
			body,
			context,
		}
	}

	pub fn network(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Network(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn response_parse(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ResponseParse(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn request_serialization(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RequestSerialization(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn url_rotation(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::UrlRotation(ErrorContext::new(msg, source, metadata))
	}

	pub fn is_rate_limited(&self) -> bool {
		matches!(self, Self::Http { status_code, .. } if *status_code == reqwest::StatusCode::TOO_MANY_REQUESTS)
	}
}

impl TraceableError for TransportError {
	fn trace_id(&self) -> String {
		match self {
			Self::Http { context, .. } => context.trace_id.clone(),
			Self::Network(ctx)
			| Self::ResponseParse(ctx)
			| Self::RequestSerialization(ctx)
			| Self::UrlRotation(ctx) => ctx.trace_id.clone(),
		}
	}
}

/// Errors returned by a [`super::ChainReader`]
#[derive(Debug, ThisError)]
pub enum ChainReaderError {
	/// Provider throttled the request; retry after a delay
	#[error("Rate limited: {0}")]
	RateLimited(ErrorContext),

	/// Provider refused the block range or result size; retry after a delay
	#[error("Range too large: {0}")]
	RangeTooLarge(ErrorContext),

	/// Any other request failure
	#[error("Request error: {0}")]
	RequestError(ErrorContext),

	/// No transport configured for the chain id
	#[error("Unsupported chain: {0}")]
	UnsupportedChain(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl ChainReaderError {
	pub fn rate_limited(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RateLimited(ErrorContext::new(msg, source, metadata))
	}

	pub fn range_too_large(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RangeTooLarge(ErrorContext::new(msg, source, metadata))
	}

	pub fn request_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RequestError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn unsupported_chain(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::UnsupportedChain(ErrorContext::new_with_log(msg, source, metadata))
	}

	/// Whether the failed call may succeed when repeated later
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::RateLimited(_) | Self::RangeTooLarge(_))
	}
}

impl TraceableError for ChainReaderError {
	fn trace_id(&self) -> String {
		match self {
			Self::RateLimited(ctx)
			| Self::RangeTooLarge(ctx)
			| Self::RequestError(ctx)
			| Self::UnsupportedChain(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
