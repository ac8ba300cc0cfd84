use chain_listener::{
	models::{listener_key, ChainConfig, LogEvent, ScannerConfig},
	services::{
		checkpoint::CheckpointStore,
		listener::{ListenerNotification, ManagerSettings},
	},
	utils::{
		tests::builders::{event::LogEventBuilder, listener::TEST_CONTRACT},
		RetryConfig,
	},
};
use serde_json::{json, Value};
use std::{collections::HashMap, time::Duration};
use tokio::sync::broadcast;

pub const TRANSFER_TOPIC: &str =
	"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
pub const BOB: &str = "0x0000000000000000000000000000000000000b0b";

/// A `Transfer` from alice to bob at `block`
pub fn create_test_log(block: u64, log_index: u64) -> LogEvent {
	LogEventBuilder::new()
		.block_number(block)
		.log_index(log_index)
		.address(TEST_CONTRACT)
		.transfer(ALICE, BOB, "1000")
		.build()
}

/// Manager settings with short intervals for tests
pub fn create_test_settings(chunk_size: u64) -> ManagerSettings {
	ManagerSettings {
		scanner: ScannerConfig {
			chunk_size,
			poll_interval_ms: 10,
			buffer_resume_wait_ms: 10,
			..Default::default()
		},
		confirmations: HashMap::new(),
	}
}

/// Same as [`create_test_settings`] with a fast scanner retry policy
pub fn create_fast_retry_settings(chunk_size: u64, max_attempts: usize) -> ManagerSettings {
	let mut settings = create_test_settings(chunk_size);
	settings.scanner.retry.max_attempts = max_attempts;
	settings.scanner.retry.base_delay_ms = 1;
	settings.scanner.retry.max_delay_ms = 8;
	settings
}

/// HTTP retry policy that never retries
pub fn no_retry() -> RetryConfig {
	RetryConfig {
		max_retries: 0,
		..RetryConfig::default()
	}
}

/// Chain 1 served by `rpc_urls`, no confirmation depth
pub fn create_test_chain(rpc_urls: Vec<String>) -> ChainConfig {
	ChainConfig {
		chain_id: 1,
		name: "testnet".to_string(),
		rpc_urls,
		confirmation_blocks: 0,
	}
}

/// JSON-RPC success envelope
pub fn rpc_result(result: Value) -> String {
	json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

/// Transaction hash [`create_rpc_log`] assigns to a log
pub fn rpc_log_hash(block: u64, log_index: u64) -> String {
	format!("0x{:064x}", block * 1000 + log_index)
}

fn pad_address(address: &str) -> String {
	format!("0x{:0>64}", address.trim_start_matches("0x"))
}

/// JSON-RPC log object as returned by `eth_getLogs`
pub fn create_rpc_log(block: u64, log_index: u64, value: u64) -> Value {
	json!({
		"address": TEST_CONTRACT,
		"topics": [TRANSFER_TOPIC, pad_address(ALICE), pad_address(BOB)],
		"data": format!("0x{:064x}", value),
		"blockNumber": format!("0x{:x}", block),
		"transactionHash": rpc_log_hash(block, log_index),
		"logIndex": format!("0x{:x}", log_index),
		"removed": false
	})
}

/// Waits until the stored checkpoint of `listener_id` reaches `expected`
pub async fn wait_for_checkpoint<S: CheckpointStore + ?Sized>(
	store: &S,
	listener_id: &str,
	expected: u64,
) {
	let key = listener_key(listener_id);
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			let checkpoint = store
				.get(&key)
				.await
				.unwrap()
				.and_then(|record| record.checkpoint);
			if checkpoint == Some(expected) {
				break;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("checkpoint not reached in time");
}

/// Next notification for `listener_id`, skipping other listeners
pub async fn next_notification(
	notifications: &mut broadcast::Receiver<ListenerNotification>,
	listener_id: &str,
) -> ListenerNotification {
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			let notification = notifications.recv().await.unwrap();
			if notification.listener_id() == listener_id {
				return notification;
			}
		}
	})
	.await
	.expect("no notification in time")
}
