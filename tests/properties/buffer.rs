use std::collections::VecDeque;

use chain_listener::services::listener::EventBuffer;
use proptest::{prelude::*, test_runner::Config};

use crate::properties::strategies::buffer_ops_strategy;
use chain_listener::utils::tests::builders::event::LogEventBuilder;

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	// The buffer behaves like a bounded FIFO queue
	#[test]
	fn test_buffer_is_bounded_fifo(capacity in 1usize..16, ops in buffer_ops_strategy()) {
		let buffer = EventBuffer::new(capacity);
		let mut model = VecDeque::new();
		let mut next_block = 0u64;
		let mut rejections = 0u64;

		for push in ops {
			if push {
				let accepted = buffer.push(LogEventBuilder::new().block_number(next_block).build());
				prop_assert_eq!(accepted, model.len() < capacity);
				if accepted {
					model.push_back(next_block);
				} else {
					rejections += 1;
				}
				next_block += 1;
			} else {
				let popped = buffer.pop().map(|event| event.block_number);
				prop_assert_eq!(popped, model.pop_front());
			}

			prop_assert!(buffer.len() <= capacity);
			prop_assert_eq!(buffer.len(), model.len());
		}

		// at most one signal per rejected push, none without rejections
		prop_assert!(buffer.pause_signal_count() <= rejections);
		prop_assert_eq!(buffer.pause_signal_count() == 0, rejections == 0);
	}

	// Paused buffers resume only once drained below half capacity
	#[test]
	fn test_pause_until_half_drained(capacity in 1usize..32) {
		let buffer = EventBuffer::new(capacity);
		for block in 0..=capacity as u64 {
			buffer.push(LogEventBuilder::new().block_number(block).build());
		}
		prop_assert!(buffer.is_paused());

		while buffer.len() * 2 >= capacity {
			prop_assert!(buffer.is_paused());
			buffer.pop();
		}
		prop_assert!(!buffer.is_paused());
		prop_assert_eq!(buffer.pause_signal_count(), 1);
	}
}
