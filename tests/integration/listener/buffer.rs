use chain_listener::services::listener::{EventBuffer, FlowState};

use crate::integration::mocks::create_test_log;

#[tokio::test]
async fn test_six_pushes_into_capacity_four() {
	let buffer = EventBuffer::new(4);
	let mut flow = buffer.subscribe();

	let accepted: Vec<bool> = (0..6).map(|i| buffer.push(create_test_log(100 + i, 0))).collect();

	assert_eq!(accepted, vec![true, true, true, true, false, false]);
	assert_eq!(buffer.len(), 4);
	assert_eq!(buffer.pause_signal_count(), 1);
	assert_eq!(*flow.borrow_and_update(), FlowState::Paused);
}

#[tokio::test]
async fn test_consumer_drain_resumes_flow() {
	let buffer = EventBuffer::new(4);
	for i in 0..4 {
		assert!(buffer.push(create_test_log(i, 0)));
	}
	assert!(!buffer.is_paused());
	assert!(!buffer.push(create_test_log(4, 0)));
	assert!(buffer.is_paused());

	let first = buffer.recv().await.unwrap();
	assert_eq!(first.block_number, 0);
	assert!(buffer.is_paused());

	buffer.recv().await.unwrap();
	buffer.recv().await.unwrap();
	assert!(!buffer.is_paused());
	assert!(buffer.push(create_test_log(10, 0)));
}

#[tokio::test]
async fn test_receiver_sees_close_after_drain() {
	let buffer = std::sync::Arc::new(EventBuffer::new(2));
	assert!(buffer.push(create_test_log(1, 0)));

	let consumer = {
		let buffer = buffer.clone();
		tokio::spawn(async move {
			let mut received = Vec::new();
			while let Some(event) = buffer.recv().await {
				received.push(event.block_number);
			}
			received
		})
	};

	tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	buffer.close();

	assert_eq!(consumer.await.unwrap(), vec![1]);
	assert!(!buffer.push(create_test_log(2, 0)));
}
