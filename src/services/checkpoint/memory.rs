use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex};

use crate::{
	models::ListenerRecord,
	services::checkpoint::{CheckpointStore, CheckpointStoreError},
};

/// In-memory checkpoint store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryCheckpointStore {
	records: Mutex<HashMap<String, ListenerRecord>>,
}

impl MemoryCheckpointStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, ListenerRecord>> {
		self.records.lock().unwrap_or_else(|p| p.into_inner())
	}
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
	async fn list_keys(&self) -> Result<Vec<String>, CheckpointStoreError> {
		let mut keys: Vec<String> = self.records().keys().cloned().collect();
		keys.sort();
		Ok(keys)
	}

	async fn get(&self, key: &str) -> Result<Option<ListenerRecord>, CheckpointStoreError> {
		Ok(self.records().get(key).cloned())
	}

	async fn set(&self, key: &str, record: &ListenerRecord) -> Result<(), CheckpointStoreError> {
		self.records().insert(key.to_string(), record.clone());
		Ok(())
	}

	async fn set_checkpoint(&self, key: &str, block: u64) -> Result<(), CheckpointStoreError> {
		match self.records().get_mut(key) {
			Some(record) => {
				record.checkpoint = Some(block);
				Ok(())
			}
			None => Err(CheckpointStoreError::not_found(
				"Cannot update checkpoint of a missing record",
				None,
				Some(HashMap::from([("key".to_string(), key.to_string())])),
			)),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), CheckpointStoreError> {
		self.records().remove(key);
		Ok(())
	}
}
