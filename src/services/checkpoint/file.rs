//! File-backed checkpoint store.
//!
//! Every record is a JSON file named after its url-encoded key
//! (`listener%3A<id>.json`). Writes go to a temporary sibling first and are
//! renamed into place, so a crash never leaves a half-written record.

use async_trait::async_trait;
use glob::glob;
use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
};
use tokio::sync::Mutex as AsyncMutex;

use crate::{
	models::ListenerRecord,
	services::checkpoint::{CheckpointStore, CheckpointStoreError},
};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

fn key_metadata(key: &str) -> Option<HashMap<String, String>> {
	Some(HashMap::from([("key".to_string(), key.to_string())]))
}

/// Stores listener records as JSON files inside `storage_path`
#[derive(Clone)]
pub struct FileCheckpointStore {
	storage_path: PathBuf,
	/// Serialises writers of the same key; distinct keys never wait on each other
	key_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl FileCheckpointStore {
	pub fn new(storage_path: PathBuf) -> Self {
		Self {
			storage_path,
			key_locks: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	pub fn storage_path(&self) -> &Path {
		&self.storage_path
	}

	fn record_path(&self, key: &str) -> PathBuf {
		self.storage_path
			.join(format!("{}.{}", urlencoding::encode(key), RECORD_EXTENSION))
	}

	fn temp_path(&self, key: &str) -> PathBuf {
		self.storage_path
			.join(format!("{}.{}", urlencoding::encode(key), TEMP_EXTENSION))
	}

	fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut locks = self.key_locks.lock().unwrap_or_else(|p| p.into_inner());
		locks.entry(key.to_string()).or_default().clone()
	}

	/// Drops the lock entry of `key` when nobody else holds it.
	fn release_key_lock(&self, key: &str) {
		let mut locks = self.key_locks.lock().unwrap_or_else(|p| p.into_inner());
		if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
			locks.remove(key);
		}
	}

	async fn read_record(&self, key: &str) -> Result<Option<ListenerRecord>, CheckpointStoreError> {
		let content = match tokio::fs::read_to_string(self.record_path(key)).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(CheckpointStoreError::storage_error(
					"Failed to read record",
					Some(Box::new(e)),
					key_metadata(key),
				))
			}
		};

		serde_json::from_str(&content).map(Some).map_err(|e| {
			CheckpointStoreError::serialization_error(
				"Failed to decode record",
				Some(Box::new(e)),
				key_metadata(key),
			)
		})
	}

	async fn write_record(
		&self,
		key: &str,
		record: &ListenerRecord,
	) -> Result<(), CheckpointStoreError> {
		let json = serde_json::to_vec_pretty(record).map_err(|e| {
			CheckpointStoreError::serialization_error(
				"Failed to encode record",
				Some(Box::new(e)),
				key_metadata(key),
			)
		})?;

		let storage_error = |e: std::io::Error| {
			CheckpointStoreError::storage_error(
				"Failed to write record",
				Some(Box::new(e)),
				key_metadata(key),
			)
		};

		tokio::fs::create_dir_all(&self.storage_path)
			.await
			.map_err(storage_error)?;

		let temp_path = self.temp_path(key);
		tokio::fs::write(&temp_path, json)
			.await
			.map_err(storage_error)?;
		tokio::fs::rename(&temp_path, self.record_path(key))
			.await
			.map_err(storage_error)?;
		Ok(())
	}
}

impl Default for FileCheckpointStore {
	fn default() -> Self {
		Self::new(PathBuf::from("data"))
	}
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
	async fn list_keys(&self) -> Result<Vec<String>, CheckpointStoreError> {
		if !self.storage_path.exists() {
			return Ok(Vec::new());
		}

		let pattern = self
			.storage_path
			.join(format!("*.{}", RECORD_EXTENSION))
			.to_string_lossy()
			.to_string();

		let entries = glob(&pattern).map_err(|e| {
			CheckpointStoreError::storage_error("Invalid storage path", Some(Box::new(e)), None)
		})?;

		let mut keys = Vec::new();
		for entry in entries.flatten() {
			let Some(stem) = entry.file_stem().map(|s| s.to_string_lossy().to_string()) else {
				continue;
			};
			match urlencoding::decode(&stem) {
				Ok(key) => keys.push(key.into_owned()),
				Err(e) => tracing::warn!(file = %entry.display(), error = %e, "Skipping undecodable record file"),
			}
		}
		keys.sort();
		Ok(keys)
	}

	async fn get(&self, key: &str) -> Result<Option<ListenerRecord>, CheckpointStoreError> {
		self.read_record(key).await
	}

	async fn set(&self, key: &str, record: &ListenerRecord) -> Result<(), CheckpointStoreError> {
		let lock = self.key_lock(key);
		let _guard = lock.lock().await;
		self.write_record(key, record).await
	}

	async fn set_checkpoint(&self, key: &str, block: u64) -> Result<(), CheckpointStoreError> {
		let lock = self.key_lock(key);
		let _guard = lock.lock().await;

		let mut record = self.read_record(key).await?.ok_or_else(|| {
			CheckpointStoreError::not_found(
				"Cannot update checkpoint of a missing record",
				None,
				key_metadata(key),
			)
		})?;
		record.checkpoint = Some(block);
		self.write_record(key, &record).await
	}

	async fn delete(&self, key: &str) -> Result<(), CheckpointStoreError> {
		let lock = self.key_lock(key);
		let result = {
			let _guard = lock.lock().await;
			match tokio::fs::remove_file(self.record_path(key)).await {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(CheckpointStoreError::storage_error(
					"Failed to delete record",
					Some(Box::new(e)),
					key_metadata(key),
				)),
			}
		};
		drop(lock);
		self.release_key_lock(key);
		result
	}
}
