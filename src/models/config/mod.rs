//! Configuration loading and validation.
//!
//! Both the service configuration file and queued listener requests are JSON
//! documents loaded through [`ConfigLoader`].

#![allow(clippy::result_large_err)]

use async_trait::async_trait;
use std::{collections::HashMap, path::Path};

mod error;
mod service_config;

pub use error::ConfigError;
pub use service_config::{
	ChainConfig, FetchRetryConfig, QueueConfig, ScannerConfig, ServiceConfig, StorageConfig,
};

use crate::models::ListenerRequest;

/// Common interface for JSON documents read from disk
#[async_trait]
pub trait ConfigLoader: Sized {
	/// Reads, parses and validates the document at `path`.
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError>;

	/// Returns Ok(()) if valid, or a validation error otherwise.
	fn validate(&self) -> Result<(), ConfigError>;

	fn is_json_file(path: &Path) -> bool {
		path.extension()
			.map(|ext| ext.to_string_lossy().to_lowercase() == "json")
			.unwrap_or(false)
	}
}

fn path_metadata(path: &Path) -> Option<HashMap<String, String>> {
	Some(HashMap::from([(
		"path".to_string(),
		path.display().to_string(),
	)]))
}

/// Reads and deserializes a JSON file, attaching the path to any error.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
	let content = tokio::fs::read_to_string(path).await.map_err(|e| {
		ConfigError::file_error(
			format!("failed to read {}", path.display()),
			Some(Box::new(e)),
			path_metadata(path),
		)
	})?;

	serde_json::from_str(&content).map_err(|e| {
		ConfigError::parse_error(
			format!("failed to parse {}", path.display()),
			Some(Box::new(e)),
			path_metadata(path),
		)
	})
}

#[async_trait]
impl ConfigLoader for ListenerRequest {
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let request: Self = read_json(path).await?;
		request.validate()?;
		Ok(request)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		// Full validation needs a generated id; build a throwaway config for it.
		self.clone().into_config().map(|_| ())
	}
}
