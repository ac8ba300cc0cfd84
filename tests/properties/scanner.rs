use backon::BackoffBuilder;
use chain_listener::{
	models::FetchRetryConfig,
	services::listener::{fetch_backoff, next_chunk},
};
use proptest::{prelude::*, test_runner::Config};
use std::time::Duration;

/// Every range a scan standing at `from` fetches on its way to `latest`
fn walk(from: u64, latest: u64, chunk_size: u64) -> Vec<(u64, u64)> {
	let mut chunks = Vec::new();
	let mut cursor = Some(from);
	while let Some((start, end)) = cursor.and_then(|block| next_chunk(block, latest, chunk_size)) {
		chunks.push((start, end));
		cursor = end.checked_add(1);
	}
	chunks
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	// Chunks tile [from, to] exactly, in order, none larger than the chunk size
	#[test]
	fn test_chunks_cover_range(from in 0u64..1_000_000, span in 0u64..50_000, chunk in 1u64..5_000) {
		let to = from + span;
		let chunks = walk(from, to, chunk);

		prop_assert_eq!(chunks.first().map(|c| c.0), Some(from));
		prop_assert_eq!(chunks.last().map(|c| c.1), Some(to));
		prop_assert_eq!(chunks.len() as u64, span / chunk + 1);

		for (start, end) in &chunks {
			prop_assert!(start <= end);
			prop_assert!(end - start < chunk);
		}
		for pair in chunks.windows(2) {
			prop_assert_eq!(pair[0].1 + 1, pair[1].0);
		}
	}

	#[test]
	fn test_empty_range_has_no_chunks(from in 1u64..u64::MAX, chunk in 1u64..5_000) {
		prop_assert_eq!(next_chunk(from, from - 1, chunk), None);
	}

	#[test]
	fn test_chunks_reach_u64_max(offset in 0u64..100, chunk in 1u64..50) {
		let chunks = walk(u64::MAX - offset, u64::MAX, chunk);
		prop_assert_eq!(chunks.last().map(|c| c.1), Some(u64::MAX));
	}

	// Delays double from the base, never exceed the cap, one fewer than attempts
	#[test]
	fn test_backoff_schedule(
		max_attempts in 1usize..10,
		base_delay_ms in 1u64..500,
		cap_factor in 1u64..64,
	) {
		let retry = FetchRetryConfig {
			max_attempts,
			base_delay_ms,
			max_delay_ms: base_delay_ms * cap_factor,
		};
		let delays: Vec<Duration> = fetch_backoff(&retry).build().collect();

		prop_assert_eq!(delays.len(), max_attempts - 1);
		if let Some(first) = delays.first() {
			prop_assert_eq!(*first, Duration::from_millis(base_delay_ms));
		}
		for delay in &delays {
			prop_assert!(*delay <= Duration::from_millis(retry.max_delay_ms));
		}
		for pair in delays.windows(2) {
			prop_assert!(pair[0] <= pair[1]);
		}
	}

	// Any schedule the service accepts waits strictly longer before every retry
	#[test]
	fn test_accepted_backoff_strictly_increases(
		max_attempts in 1usize..12,
		base_delay_ms in 0u64..2_000,
		max_delay_ms in 0u64..600_000,
	) {
		let retry = FetchRetryConfig {
			max_attempts,
			base_delay_ms,
			max_delay_ms,
		};
		prop_assume!(retry.validate().is_ok());

		let delays: Vec<Duration> = fetch_backoff(&retry).build().collect();
		prop_assert_eq!(delays.len(), max_attempts - 1);
		for pair in delays.windows(2) {
			prop_assert!(pair[0] < pair[1]);
		}
	}
}
