//! Bootstrap module for building the service from its configuration.
//!
//! Turns a [`ServiceConfig`] into the concrete pieces the binary runs: the
//! checkpoint store, the chain reader, the callback router, the
//! [`ListenerManager`] wiring them together and the optional request queue.

use std::{error::Error, path::Path, sync::Arc};

use crate::{
	models::{ConfigLoader, ServiceConfig, StorageConfig},
	services::{
		callback::CallbackRouter,
		chain::EvmChainReader,
		checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore},
		listener::{ListenerManager, ManagerSettings},
		queue::FileRequestQueue,
	},
};

/// Type alias for handling ServiceResult
pub type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Manager as assembled by the binary
pub type Manager = ListenerManager<EvmChainReader, dyn CheckpointStore, CallbackRouter>;

/// Loads and validates the service configuration file.
pub async fn load_service_config(path: &Path) -> Result<ServiceConfig> {
	let config = ServiceConfig::load_from_path(path).await?;
	tracing::info!(
		path = %path.display(),
		chains = config.chains.len(),
		"Service configuration loaded"
	);
	Ok(config)
}

/// Creates the checkpoint store selected by the configuration.
pub fn create_checkpoint_store(storage: &StorageConfig) -> Arc<dyn CheckpointStore> {
	match storage {
		StorageConfig::File { path } => {
			tracing::info!(path = %path.display(), "Using file checkpoint store");
			Arc::new(FileCheckpointStore::new(path.clone()))
		}
		StorageConfig::Memory => {
			tracing::warn!("Using in-memory checkpoint store, listeners will not survive a restart");
			Arc::new(MemoryCheckpointStore::new())
		}
	}
}

/// Wires chain reader, callbacks and `store` into a manager.
///
/// Must be called from within a tokio runtime.
pub fn create_manager(config: &ServiceConfig, store: Arc<dyn CheckpointStore>) -> Result<Manager> {
	let reader = EvmChainReader::new(&config.chains, &config.http_retry)?;
	let callback = CallbackRouter::from_retry_config(&config.http_retry);

	Ok(ListenerManager::new(
		Arc::new(reader),
		store,
		Arc::new(callback),
		ManagerSettings {
			scanner: config.scanner.clone(),
			confirmations: config.confirmations(),
		},
	))
}

/// The request queue, if one is configured
pub fn create_request_queue(config: &ServiceConfig) -> Option<FileRequestQueue> {
	config.queue.as_ref().map(FileRequestQueue::new)
}

/// Loads the configuration and builds the manager it describes.
pub async fn initialize_services(config_path: &Path) -> Result<(ServiceConfig, Manager)> {
	let config = load_service_config(config_path).await?;
	let store = create_checkpoint_store(&config.storage);
	let manager = create_manager(&config, store)?;
	Ok((config, manager))
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Error waiting for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!("Error installing SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
