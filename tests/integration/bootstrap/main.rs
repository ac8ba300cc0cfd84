use chain_listener::{
	bootstrap::{create_checkpoint_store, create_request_queue, initialize_services, load_service_config},
	models::{listener_key, ListenerRecord, ListenerStatus, StorageConfig},
	services::checkpoint::CheckpointStore,
	utils::tests::builders::listener::ListenerConfigBuilder,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::integration::mocks::{rpc_result, wait_for_checkpoint};

fn write_config(dir: &Path, value: serde_json::Value) -> PathBuf {
	let path = dir.join("listener.json");
	std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
	path
}

fn service_config(dir: &Path, rpc_url: &str) -> serde_json::Value {
	json!({
		"chains": [
			{
				"chain_id": 1,
				"name": "mainnet",
				"rpc_urls": [rpc_url, "http://localhost:8546"],
				"confirmation_blocks": 12
			},
			{
				"chain_id": 8453,
				"name": "base",
				"rpc_urls": ["http://localhost:9545"]
			}
		],
		"scanner": {
			"chunk_size": 500,
			"poll_interval_ms": 1000,
			"retry": { "max_attempts": 4, "base_delay_ms": 100, "max_delay_ms": 2000 }
		},
		"storage": { "type": "file", "path": dir.join("listeners") },
		"queue": { "path": dir.join("requests"), "poll_interval_ms": 250 }
	})
}

#[tokio::test]
async fn test_shipped_config_is_valid() {
	let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/listener.json");
	let config = load_service_config(&path).await.unwrap();
	assert!(!config.chains.is_empty());
}

#[tokio::test]
async fn test_initialize_services_from_file() {
	let dir = TempDir::new().unwrap();
	let path = write_config(dir.path(), service_config(dir.path(), "http://localhost:8545"));

	let (config, manager) = initialize_services(&path).await.unwrap();

	assert_eq!(config.scanner.chunk_size, 500);
	assert_eq!(config.scanner.retry.max_attempts, 4);
	assert_eq!(config.confirmations().get(&1), Some(&12));
	assert_eq!(config.confirmations().get(&8453), Some(&0));
	assert_eq!(
		create_request_queue(&config).unwrap().path(),
		dir.path().join("requests")
	);
	assert!(manager.active_listeners().await.is_empty());
}

#[tokio::test]
async fn test_restore_through_bootstrapped_store() {
	let mut node = Server::new_async().await;
	for (method, result) in [("eth_blockNumber", json!("0x10")), ("eth_getLogs", json!([]))] {
		node.mock("POST", "/")
			.match_body(Matcher::PartialJson(json!({ "method": method })))
			.with_body(rpc_result(result))
			.create_async()
			.await;
	}

	let dir = TempDir::new().unwrap();
	let path = write_config(dir.path(), service_config(dir.path(), &node.url()));

	let storage = StorageConfig::File {
		path: dir.path().join("listeners"),
	};
	let store = create_checkpoint_store(&storage);
	let config = ListenerConfigBuilder::new().start_block(1).build();
	let id = config.id.clone();
	store
		.set(&listener_key(&id), &ListenerRecord::new(config))
		.await
		.unwrap();

	let (_, manager) = initialize_services(&path).await.unwrap();
	let report = manager.restore_listeners().await.unwrap();

	assert_eq!(report.restored, vec![id.clone()]);
	wait_for_checkpoint(store.as_ref(), &id, 16 - 12).await;
	assert_eq!(manager.status(&id).await, Some(ListenerStatus::Active));

	manager.shutdown().await;
	assert!(store.get(&listener_key(&id)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_rejects_duplicate_chain_ids() {
	let dir = TempDir::new().unwrap();
	let mut config = service_config(dir.path(), "http://localhost:8545");
	config["chains"][1]["chain_id"] = json!(1);
	let path = write_config(dir.path(), config);

	assert!(initialize_services(&path).await.is_err());
}
