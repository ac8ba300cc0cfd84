use std::sync::{Arc, Mutex};

use chain_listener::{
	models::{listener_key, ListenerRecord},
	services::{
		checkpoint::{CheckpointStore, FileCheckpointStore},
		listener::ListenerManager,
	},
	utils::tests::builders::listener::ListenerConfigBuilder,
};
use tempfile::TempDir;

use crate::integration::mocks::{
	create_test_settings, wait_for_checkpoint, MockChainReader, MockEventCallback,
};

fn reader_at(height: u64, ranges: Arc<Mutex<Vec<(u64, u64)>>>) -> MockChainReader {
	let mut reader = MockChainReader::new();
	reader
		.expect_current_block_height()
		.returning(move |_| Ok(height));
	reader.expect_get_logs().returning(move |_, _, from, to| {
		ranges.lock().unwrap().push((from, to));
		Ok(vec![])
	});
	reader
}

fn silent_callback() -> MockEventCallback {
	let mut callback = MockEventCallback::new();
	callback.expect_on_event().returning(|_, _| Ok(()));
	callback
}

#[tokio::test]
async fn test_listener_survives_restart() {
	let dir = TempDir::new().unwrap();
	let config = ListenerConfigBuilder::new()
		.start_block(100)
		.correlation("order", "42")
		.build();
	let id = config.id.clone();

	let first_run = Arc::new(Mutex::new(Vec::new()));
	let store = Arc::new(FileCheckpointStore::new(dir.path().to_path_buf()));
	let manager = ListenerManager::new(
		Arc::new(reader_at(1500, first_run.clone())),
		store.clone(),
		Arc::new(silent_callback()),
		create_test_settings(1000),
	);
	manager.create_listener(config.clone()).await.unwrap();
	wait_for_checkpoint(store.as_ref(), &id, 1500).await;
	manager.shutdown().await;
	assert_eq!(*first_run.lock().unwrap(), vec![(100, 1099), (1100, 1500)]);

	// a fresh process only sees the files
	let second_run = Arc::new(Mutex::new(Vec::new()));
	let store = Arc::new(FileCheckpointStore::new(dir.path().to_path_buf()));
	let stored = store.get(&listener_key(&id)).await.unwrap().unwrap();
	assert_eq!(stored.config, config);
	assert_eq!(stored.checkpoint, Some(1500));

	let manager = ListenerManager::new(
		Arc::new(reader_at(1800, second_run.clone())),
		store.clone(),
		Arc::new(silent_callback()),
		create_test_settings(1000),
	);
	let report = manager.restore_listeners().await.unwrap();
	assert_eq!(report.restored, vec![id.clone()]);

	wait_for_checkpoint(store.as_ref(), &id, 1800).await;
	assert_eq!(second_run.lock().unwrap()[0], (1501, 1800));
	manager.shutdown().await;
}

#[tokio::test]
async fn test_records_are_one_file_per_key() {
	let dir = TempDir::new().unwrap();
	let store = FileCheckpointStore::new(dir.path().to_path_buf());

	let first = ListenerRecord::new(ListenerConfigBuilder::new().build());
	let second = ListenerRecord::new(ListenerConfigBuilder::new().build());
	let first_key = listener_key(&first.config.id);
	let second_key = listener_key(&second.config.id);
	store.set(&first_key, &first).await.unwrap();
	store.set(&second_key, &second).await.unwrap();

	let encoded = dir
		.path()
		.join(format!("listener%3A{}.json", first.config.id));
	assert!(encoded.exists());

	let mut expected = vec![first_key.clone(), second_key.clone()];
	expected.sort();
	assert_eq!(store.list_keys().await.unwrap(), expected);

	store.delete(&first_key).await.unwrap();
	assert!(!encoded.exists());
	assert_eq!(store.list_keys().await.unwrap(), vec![second_key]);
}

#[tokio::test]
async fn test_stray_temp_files_are_not_records() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("listener%3Aabc.json.tmp"), "{").unwrap();

	let store = FileCheckpointStore::new(dir.path().to_path_buf());
	assert!(store.list_keys().await.unwrap().is_empty());
}
