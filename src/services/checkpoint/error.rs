//! Checkpoint store error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Errors returned by [`super::CheckpointStore`] implementations
#[derive(ThisError, Debug)]
pub enum CheckpointStoreError {
	/// A field update targeted a record that does not exist
	#[error("Record not found: {0}")]
	NotFound(ErrorContext),

	/// Reading or writing the backing storage failed
	#[error("Storage error: {0}")]
	StorageError(ErrorContext),

	/// A record could not be encoded or decoded
	#[error("Serialization error: {0}")]
	SerializationError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl CheckpointStoreError {
	// Missing records are an expected outcome for callers, so this one is not logged
	pub fn not_found(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NotFound(ErrorContext::new(msg, source, metadata))
	}

	pub fn storage_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::StorageError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn serialization_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::SerializationError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for CheckpointStoreError {
	fn trace_id(&self) -> String {
		match self {
			Self::NotFound(ctx) | Self::StorageError(ctx) | Self::SerializationError(ctx) => {
				ctx.trace_id.clone()
			}
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
