use async_trait::async_trait;
use mockall::mock;

use chain_listener::{
	models::{ListenerFilter, ListenerRecord, ListenerRequest, ListenerResponse, ListenerConfig, LogEvent},
	services::{
		callback::{CallbackError, EventCallback},
		chain::{ChainReader, ChainReaderError},
		checkpoint::{CheckpointStore, CheckpointStoreError},
		listener::ListenerError,
		queue::RequestHandler,
	},
};

mock! {
	pub ChainReader {}

	#[async_trait]
	impl ChainReader for ChainReader {
		async fn current_block_height(&self, chain_id: u64) -> Result<u64, ChainReaderError>;
		async fn get_logs(
			&self,
			chain_id: u64,
			filter: &ListenerFilter,
			from_block: u64,
			to_block: u64,
		) -> Result<Vec<LogEvent>, ChainReaderError>;
	}
}

mock! {
	pub CheckpointStore {}

	#[async_trait]
	impl CheckpointStore for CheckpointStore {
		async fn list_keys(&self) -> Result<Vec<String>, CheckpointStoreError>;
		async fn get(&self, key: &str) -> Result<Option<ListenerRecord>, CheckpointStoreError>;
		async fn set(&self, key: &str, record: &ListenerRecord) -> Result<(), CheckpointStoreError>;
		async fn set_checkpoint(&self, key: &str, block: u64) -> Result<(), CheckpointStoreError>;
		async fn delete(&self, key: &str) -> Result<(), CheckpointStoreError>;
	}
}

mock! {
	pub EventCallback {}

	#[async_trait]
	impl EventCallback for EventCallback {
		async fn on_event(&self, config: &ListenerConfig, event: &LogEvent) -> Result<(), CallbackError>;
	}
}

mock! {
	pub RequestHandler {}

	#[async_trait]
	impl RequestHandler for RequestHandler {
		async fn handle(&self, request: ListenerRequest) -> Result<ListenerResponse, ListenerError>;
	}
}
