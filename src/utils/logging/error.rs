//! Structured error context shared by every service error type.
//!
//! [`ErrorContext`] carries a message, an optional boxed source, key/value metadata,
//! a timestamp and a trace id. Service errors wrap it in their variants so a single
//! failure can be followed through the logs by its trace id.

use chrono::Utc;
use std::{collections::HashMap, fmt};
use uuid::Uuid;

/// Error payload with metadata, timestamp and trace id.
#[derive(Debug)]
pub struct ErrorContext {
	/// Human readable description
	pub message: String,
	/// Underlying cause, if any
	pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
	/// Extra key/value pairs (listener id, chain id, block range, ...)
	pub metadata: Option<HashMap<String, String>>,
	/// RFC 3339 creation time
	pub timestamp: String,
	/// UUID v4, inherited from the source when the source already has one
	pub trace_id: String,
}

impl ErrorContext {
	/// Creates a context without logging it.
	pub fn new(
		message: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let trace_id = match source {
			Some(ref src) => TraceableError::trace_id(src.as_ref()),
			None => Uuid::new_v4().to_string(),
		};

		Self {
			message: message.into(),
			source,
			metadata,
			timestamp: Utc::now().to_rfc3339(),
			trace_id,
		}
	}

	/// Creates a context and emits it as an `error` event.
	pub fn new_with_log(
		message: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let error_context = Self::new(message, source, metadata);
		log_error(&error_context);
		error_context
	}

	/// Adds one metadata pair, creating the map if needed.
	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata
			.get_or_insert_with(HashMap::new)
			.insert(key.into(), value.into());
		self
	}

	/// Formats as `"message [k1=v1, k2=v2]"` with keys sorted.
	pub fn format_with_metadata(&self) -> String {
		let mut result = self.message.clone();

		if let Some(metadata) = &self.metadata {
			let mut keys: Vec<_> = metadata.keys().collect();
			keys.sort();
			let parts: Vec<String> = keys
				.into_iter()
				.filter_map(|key| metadata.get(key).map(|value| format!("{}={}", key, value)))
				.collect();

			if !parts.is_empty() {
				result.push_str(&format!(" [{}]", parts.join(", ")));
			}
		}

		result
	}
}

impl fmt::Display for ErrorContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.format_with_metadata())
	}
}

impl std::error::Error for ErrorContext {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source
			.as_ref()
			.map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
	}
}

/// Errors that expose a trace id
pub trait TraceableError: std::error::Error + Send + Sync {
	fn trace_id(&self) -> String;
}

impl TraceableError for dyn std::error::Error + Send + Sync + 'static {
	fn trace_id(&self) -> String {
		if let Some(id) = try_extract_trace_id(self) {
			return id;
		}

		// Walk a few levels of the source chain before giving up
		const MAX_DEPTH: usize = 3;
		let mut source = self.source();
		let mut depth = 0;

		while let Some(err) = source {
			depth += 1;
			if depth > MAX_DEPTH {
				break;
			}
			if let Some(id) = try_extract_trace_id(err) {
				return id;
			}
			source = err.source();
		}

		Uuid::new_v4().to_string()
	}
}

fn try_extract_trace_id(err: &(dyn std::error::Error + 'static)) -> Option<String> {
	if let Some(ctx) = err.downcast_ref::<ErrorContext>() {
		return Some(ctx.trace_id.clone());
	}

	macro_rules! try_downcast {
		($($ty:path),*) => {
			$(
				if let Some(e) = err.downcast_ref::<$ty>() {
					return Some(e.trace_id());
				}
			)*
		}
	}

	try_downcast!(
		crate::services::listener::ListenerError,
		crate::services::chain::ChainReaderError,
		crate::services::chain::TransportError,
		crate::services::checkpoint::CheckpointStoreError,
		crate::services::callback::CallbackError,
		crate::services::queue::QueueError,
		crate::models::ConfigError
	);

	None
}

/// Drops HTML bodies that some RPC gateways return with error statuses
fn sanitize_error_message(message: &str) -> String {
	if message.contains("<html>") || message.contains("<head>") || message.contains("<body>") {
		if let Some(pos) = message.find('<') {
			return message[..pos].trim().to_string();
		}
	}
	message.to_string()
}

fn format_error_chain(err: &dyn std::error::Error) -> String {
	let mut result = sanitize_error_message(&err.to_string());
	let mut source = err.source();

	while let Some(err) = source {
		result.push_str("\n\tCaused by: ");
		result.push_str(&sanitize_error_message(&err.to_string()));
		source = err.source();
	}

	result
}

fn log_error(error: &ErrorContext) {
	match &error.source {
		Some(err) => tracing::error!(
			message = error.format_with_metadata(),
			trace_id = %error.trace_id,
			timestamp = %error.timestamp,
			error.chain = %format_error_chain(&**err),
			"Error occurred"
		),
		None => tracing::error!(
			message = error.format_with_metadata(),
			trace_id = %error.trace_id,
			timestamp = %error.timestamp,
			"Error occurred"
		),
	}
}
