//! Durable listener records and checkpoints.
//!
//! Each listener owns one record at `listener:<id>` holding its configuration
//! and the last fully scanned block. The store is the source of truth when the
//! process restarts.
//!
//! - [`FileCheckpointStore`]: one JSON file per record, atomically replaced
//! - [`MemoryCheckpointStore`]: process-local map for tests and ephemeral runs

mod error;
mod file;
mod memory;

pub use error::CheckpointStoreError;
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use async_trait::async_trait;

use crate::models::ListenerRecord;

/// Key/value persistence of listener records
#[async_trait]
pub trait CheckpointStore: Send + Sync {
	/// All keys currently stored
	async fn list_keys(&self) -> Result<Vec<String>, CheckpointStoreError>;

	/// The record at `key`, or `None` if there is none
	async fn get(&self, key: &str) -> Result<Option<ListenerRecord>, CheckpointStoreError>;

	/// Writes the whole record, replacing any previous value
	async fn set(&self, key: &str, record: &ListenerRecord) -> Result<(), CheckpointStoreError>;

	/// Updates only the checkpoint field.
	///
	/// Fails with [`CheckpointStoreError::NotFound`] when the record is absent so
	/// that a scanner racing with a stop cannot resurrect a deleted listener.
	async fn set_checkpoint(&self, key: &str, block: u64) -> Result<(), CheckpointStoreError>;

	/// Removes the record; deleting a missing key succeeds
	async fn delete(&self, key: &str) -> Result<(), CheckpointStoreError>;
}
