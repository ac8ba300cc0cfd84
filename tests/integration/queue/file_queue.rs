use std::sync::Arc;

use chain_listener::{
	models::{listener_key, EventFilter, ListenerResponse, QueueConfig},
	services::{
		checkpoint::{CheckpointStore, MemoryCheckpointStore},
		listener::{ListenerError, ListenerManager},
		queue::{FileRequestQueue, PollReport},
	},
	utils::tests::builders::listener::TEST_CONTRACT,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;

use crate::integration::mocks::{create_test_settings, MockChainReader, MockEventCallback, MockRequestHandler};

fn idle_reader() -> MockChainReader {
	let mut reader = MockChainReader::new();
	reader.expect_current_block_height().returning(|_| Ok(10));
	reader.expect_get_logs().returning(|_, _, _, _| Ok(vec![]));
	reader
}

fn queue_in(dir: &TempDir) -> FileRequestQueue {
	FileRequestQueue::new(&QueueConfig {
		path: dir.path().to_path_buf(),
		poll_interval_ms: 10,
	})
}

fn approval_request() -> serde_json::Value {
	json!({
		"eventName": "Approval",
		"chainId": 1,
		"filterAddress": TEST_CONTRACT.to_uppercase().replace("0X", "0x"),
		"filterArgs": {
			"from": "0x00000000000000000000000000000000000A11CE",
			"to": ["0x0000000000000000000000000000000000000b0b"]
		},
		"persistent": true,
		"startBlock": 5,
		"callbackRef": {
			"target": { "type": "webhook", "url": "https://orders.example.com/hooks" },
			"correlation": { "order": "42" }
		}
	})
}

#[tokio::test]
async fn test_queued_request_becomes_listener() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("001.json"), approval_request().to_string()).unwrap();

	let mut callback = MockEventCallback::new();
	callback.expect_on_event().never();
	let store = Arc::new(MemoryCheckpointStore::new());
	let manager = ListenerManager::new(
		Arc::new(idle_reader()),
		store.clone(),
		Arc::new(callback),
		create_test_settings(1000),
	);

	let report = queue_in(&dir).poll_once(&manager).await.unwrap();
	assert_eq!(
		report,
		PollReport {
			created: 1,
			rejected: 0,
			deferred: 0
		}
	);
	assert!(!dir.path().join("001.json").exists());

	let active = manager.active_listeners().await;
	assert_eq!(active.len(), 1);

	let record = store.get(&listener_key(&active[0])).await.unwrap().unwrap();
	assert_eq!(record.config.filter.contract_address, TEST_CONTRACT);
	assert_eq!(record.config.start_block, Some(5));
	match &record.config.filter.event {
		EventFilter::Approval { owner, spender } => {
			assert!(owner
				.as_ref()
				.unwrap()
				.matches("0x00000000000000000000000000000000000a11ce"));
			assert!(spender
				.as_ref()
				.unwrap()
				.matches("0x0000000000000000000000000000000000000b0b"));
		}
		other => panic!("unexpected filter {:?}", other),
	}

	manager.shutdown().await;
}

#[tokio::test]
async fn test_requests_are_handled_in_name_order() {
	let dir = TempDir::new().unwrap();
	for (name, chain_id) in [("b.json", 2), ("a.json", 1), ("c.json", 3)] {
		let mut request = approval_request();
		request["chainId"] = json!(chain_id);
		std::fs::write(dir.path().join(name), request.to_string()).unwrap();
	}

	let mut handler = MockRequestHandler::new();
	let mut sequence = mockall::Sequence::new();
	for chain_id in [1u64, 2, 3] {
		handler
			.expect_handle()
			.withf(move |request| request.chain_id == chain_id)
			.times(1)
			.in_sequence(&mut sequence)
			.returning(|_| {
				Ok(ListenerResponse {
					listener_id: uuid::Uuid::new_v4().to_string(),
				})
			});
	}

	let report = queue_in(&dir).poll_once(&handler).await.unwrap();
	assert_eq!(report.created, 3);
}

#[tokio::test]
async fn test_invalid_address_is_rejected() {
	let dir = TempDir::new().unwrap();
	let mut request = approval_request();
	request["filterAddress"] = json!("0x1234");
	std::fs::write(dir.path().join("bad-address.json"), request.to_string()).unwrap();

	let manager = ListenerManager::new(
		Arc::new(idle_reader()),
		Arc::new(MemoryCheckpointStore::new()),
		Arc::new(MockEventCallback::new()),
		create_test_settings(1000),
	);

	let report = queue_in(&dir).poll_once(&manager).await.unwrap();
	assert_eq!(report.rejected, 1);
	assert!(dir.path().join("failed").join("bad-address.json").exists());
	assert!(manager.active_listeners().await.is_empty());
}

#[tokio::test]
async fn test_deferred_request_is_retried_on_next_poll() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("retry.json"), approval_request().to_string()).unwrap();

	let mut handler = MockRequestHandler::new();
	let mut sequence = mockall::Sequence::new();
	handler
		.expect_handle()
		.times(1)
		.in_sequence(&mut sequence)
		.returning(|_| Err(ListenerError::persistence_error("store unavailable", None, None)));
	handler
		.expect_handle()
		.times(1)
		.in_sequence(&mut sequence)
		.returning(|_| {
			Ok(ListenerResponse {
				listener_id: uuid::Uuid::new_v4().to_string(),
			})
		});

	let queue = queue_in(&dir);
	assert_eq!(queue.poll_once(&handler).await.unwrap().deferred, 1);
	assert!(dir.path().join("retry.json").exists());

	assert_eq!(queue.poll_once(&handler).await.unwrap().created, 1);
	assert!(!dir.path().join("retry.json").exists());
}

#[tokio::test]
async fn test_run_consumes_requests_until_shutdown() {
	let dir = TempDir::new().unwrap();
	let manager = ListenerManager::new(
		Arc::new(idle_reader()),
		Arc::new(MemoryCheckpointStore::new()),
		Arc::new(MockEventCallback::new()),
		create_test_settings(1000),
	);
	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let task = {
		let manager = manager.clone();
		let queue = queue_in(&dir);
		tokio::spawn(async move { queue.run(&manager, shutdown_rx).await })
	};

	std::fs::write(dir.path().join("late.json"), approval_request().to_string()).unwrap();
	tokio::time::timeout(std::time::Duration::from_secs(5), async {
		while manager.active_listeners().await.is_empty() {
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();

	shutdown_tx.send_replace(true);
	task.await.unwrap();
	manager.shutdown().await;
}
