//! Per-listener block scanning.
//!
//! A [`BlockScanner`] walks the chain from its checkpoint to the confirmed head
//! in fixed-size chunks. Every chunk is fetched (with backoff on transient
//! provider errors), its logs are pushed into the listener's [`EventBuffer`]
//! and only then is the checkpoint moved to the end of the chunk.

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use chrono::Utc;
use std::{
	collections::HashMap,
	future::Future,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::instrument;

use crate::{
	models::{listener_key, FetchRetryConfig, ListenerConfig, ScannerConfig},
	services::{
		chain::{ChainReader, ChainReaderError},
		checkpoint::{CheckpointStore, CheckpointStoreError},
		listener::buffer::{EventBuffer, FlowState},
	},
	utils::metrics::{EVENTS_DROPPED, LISTENER_CHECKPOINT, SCANNER_ERRORS},
};

/// Scanning parameters of one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
	pub chunk_size: u64,
	pub confirmation_blocks: u64,
	pub poll_interval: Duration,
	/// Upper bound on waiting for a paused buffer
	pub resume_wait: Duration,
	pub retry: FetchRetryConfig,
}

impl ScanSettings {
	pub fn new(scanner: &ScannerConfig, confirmation_blocks: u64) -> Self {
		Self {
			chunk_size: scanner.chunk_size.max(1),
			confirmation_blocks,
			poll_interval: scanner.poll_interval(),
			resume_wait: scanner.buffer_resume_wait(),
			retry: scanner.retry.clone(),
		}
	}
}

/// Result of a single [`BlockScanner::tick`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
	/// Nothing was committed, either no new blocks or the tick ended early
	Idle,
	/// The checkpoint now points at this block
	Advanced(u64),
	/// A previous tick was still in flight
	Skipped,
	/// A one-shot listener handed its event to the buffer
	Matched,
	/// The listener's deadline has passed
	TimedOut,
	/// The shutdown signal was raised
	Cancelled,
	/// The provider failed in a way retries cannot fix
	Failed(String),
}

impl TickOutcome {
	/// Whether the scanner stops after this outcome
	pub fn is_final(&self) -> bool {
		matches!(
			self,
			Self::Matched | Self::TimedOut | Self::Cancelled | Self::Failed(_)
		)
	}
}

/// The inclusive range a scan fetches next when it stands at `from` and may
/// read up to `latest`, or `None` once `from` is past `latest`.
pub fn next_chunk(from: u64, latest: u64, chunk_size: u64) -> Option<(u64, u64)> {
	if from > latest {
		return None;
	}
	let to = from.saturating_add(chunk_size.max(1) - 1).min(latest);
	Some((from, to))
}

/// Backoff used for provider calls: doubling delays starting at the base delay,
/// capped at the max delay, `max_attempts - 1` retries.
pub fn fetch_backoff(retry: &FetchRetryConfig) -> ExponentialBuilder {
	ExponentialBuilder::default()
		.with_min_delay(retry.base_delay())
		.with_max_delay(retry.max_delay())
		.with_factor(2.0)
		.with_max_times(retry.max_attempts.saturating_sub(1))
}

fn error_kind(error: &ChainReaderError) -> &'static str {
	match error {
		ChainReaderError::RateLimited(_) => "rate_limited",
		ChainReaderError::RangeTooLarge(_) => "range_too_large",
		_ => "fetch",
	}
}

// Clears the in-flight flag even if the tick future is dropped or panics
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

/// Scanner of one listener.
///
/// Ranges are scanned strictly in increasing block order and the logs of a
/// range are pushed in the order the reader returned them.
pub struct BlockScanner<R: ?Sized, S: ?Sized> {
	config: Arc<ListenerConfig>,
	key: String,
	reader: Arc<R>,
	store: Arc<S>,
	buffer: Arc<EventBuffer>,
	settings: ScanSettings,
	cancel: watch::Receiver<bool>,
	next_block: Mutex<Option<u64>>,
	in_flight: AtomicBool,
}

impl<R, S> BlockScanner<R, S>
where
	R: ChainReader + ?Sized,
	S: CheckpointStore + ?Sized,
{
	/// `next_block` is the first block to scan; `None` starts one chunk behind
	/// the confirmed head on the first tick.
	pub fn new(
		config: Arc<ListenerConfig>,
		next_block: Option<u64>,
		reader: Arc<R>,
		store: Arc<S>,
		buffer: Arc<EventBuffer>,
		settings: ScanSettings,
		cancel: watch::Receiver<bool>,
	) -> Self {
		Self {
			key: listener_key(&config.id),
			config,
			reader,
			store,
			buffer,
			settings,
			cancel,
			next_block: Mutex::new(next_block),
			in_flight: AtomicBool::new(false),
		}
	}

	pub fn next_block(&self) -> Option<u64> {
		*self.next_block.lock().unwrap_or_else(|p| p.into_inner())
	}

	fn set_next_block(&self, block: u64) {
		*self.next_block.lock().unwrap_or_else(|p| p.into_inner()) = Some(block);
	}

	/// A dropped sender counts as cancellation: the manager owning it is gone.
	fn is_cancelled(&self) -> bool {
		*self.cancel.borrow() || self.is_orphaned()
	}

	fn is_orphaned(&self) -> bool {
		self.cancel.has_changed().is_err()
	}

	fn metadata(&self) -> HashMap<String, String> {
		HashMap::from([
			("listener_id".to_string(), self.config.id.clone()),
			("chain_id".to_string(), self.config.chain_id.to_string()),
		])
	}

	/// Polls on the configured interval until a final outcome.
	///
	/// Missed ticks are skipped rather than bursted.
	#[instrument(skip_all, fields(listener_id = %self.config.id))]
	pub async fn run(&self) -> TickOutcome {
		let mut shutdown = self.cancel.clone();
		let mut interval = tokio::time::interval(self.settings.poll_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		tracing::debug!(next_block = ?self.next_block(), "Scanner started");

		let outcome = loop {
			tokio::select! {
				_ = interval.tick() => {}
				_ = shutdown.changed() => {}
			}

			if self.is_cancelled() {
				break TickOutcome::Cancelled;
			}

			let outcome = self.tick().await;
			if outcome.is_final() {
				break outcome;
			}
		};

		if self.is_orphaned() {
			// nobody else is left to close the buffer for the processor
			self.buffer.close();
		}
		tracing::debug!(outcome = ?outcome, "Scanner finished");
		outcome
	}

	/// Runs one scan pass; a tick that overlaps a running one does nothing.
	#[instrument(skip_all, fields(listener_id = %self.config.id))]
	pub async fn tick(&self) -> TickOutcome {
		if self.in_flight.swap(true, Ordering::AcqRel) {
			return TickOutcome::Skipped;
		}
		let _guard = InFlight(&self.in_flight);

		self.scan().await
	}

	async fn scan(&self) -> TickOutcome {
		if self.config.is_expired(Utc::now()) {
			tracing::info!("Listener deadline passed without a match");
			return TickOutcome::TimedOut;
		}

		let chain_id = self.config.chain_id;
		let height = match self
			.with_retry(|| self.reader.current_block_height(chain_id))
			.await
		{
			Ok(height) => height,
			Err(e) => return TickOutcome::Failed(e.to_string()),
		};

		let latest = height.saturating_sub(self.settings.confirmation_blocks);
		let start = match self.next_block() {
			Some(block) => block,
			None => {
				let start = latest.saturating_sub(self.settings.chunk_size);
				self.set_next_block(start);
				start
			}
		};

		let mut committed = None;
		let mut cursor = Some(start);
		while let Some((from, to)) =
			cursor.and_then(|block| next_chunk(block, latest, self.settings.chunk_size))
		{
			if self.is_cancelled() {
				return TickOutcome::Cancelled;
			}

			if !self.wait_for_flow().await {
				tracing::debug!(from_block = from, "Buffer still paused, ending tick");
				break;
			}

			let filter = &self.config.filter;
			let events = match self
				.with_retry(|| self.reader.get_logs(chain_id, filter, from, to))
				.await
			{
				Ok(events) => events,
				Err(e) => return TickOutcome::Failed(e.to_string()),
			};

			for event in events {
				let delivery_id = event.delivery_id(&self.config.id);
				if self.buffer.push(event) {
					if !self.config.persistent {
						// the checkpoint stays before the match
						return TickOutcome::Matched;
					}
				} else {
					EVENTS_DROPPED.with_label_values(&[&self.config.id]).inc();
					tracing::warn!(
						delivery_id = %delivery_id,
						capacity = self.buffer.capacity(),
						"Buffer full, dropping event"
					);
				}
			}

			match self.store.set_checkpoint(&self.key, to).await {
				Ok(()) => {}
				Err(CheckpointStoreError::NotFound(_)) => {
					return TickOutcome::Failed("listener record no longer exists".to_string());
				}
				Err(e) => {
					SCANNER_ERRORS
						.with_label_values(&[&self.config.id, "checkpoint"])
						.inc();
					tracing::warn!(
						error = %e,
						to_block = to,
						"Failed to persist checkpoint, range will be rescanned"
					);
					break;
				}
			}

			LISTENER_CHECKPOINT
				.with_label_values(&[&self.config.id])
				.set(i64::try_from(to).unwrap_or(i64::MAX));
			committed = Some(to);

			cursor = to.checked_add(1);
			if let Some(next) = cursor {
				self.set_next_block(next);
			}
		}

		match committed {
			Some(block) => TickOutcome::Advanced(block),
			None => TickOutcome::Idle,
		}
	}

	/// `true` once the buffer is flowing, `false` if it stayed paused for the
	/// whole resume window.
	async fn wait_for_flow(&self) -> bool {
		let mut flow = self.buffer.subscribe();
		if *flow.borrow_and_update() == FlowState::Flowing {
			return true;
		}

		let resumed = tokio::time::timeout(self.settings.resume_wait, async {
			flow.wait_for(|state| *state == FlowState::Flowing)
				.await
				.is_ok()
		})
		.await;
		matches!(resumed, Ok(true))
	}

	async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, ChainReaderError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, ChainReaderError>>,
	{
		operation
			.retry(fetch_backoff(&self.settings.retry))
			.when(ChainReaderError::is_transient)
			.notify(|error: &ChainReaderError, delay: Duration| {
				SCANNER_ERRORS
					.with_label_values(&[&self.config.id, error_kind(error)])
					.inc();
				tracing::warn!(
					error = %error,
					retry_in_ms = delay.as_millis() as u64,
					"Transient provider error, retrying"
				);
			})
			.await
			.map_err(|error| {
				if !error.is_transient() {
					SCANNER_ERRORS
						.with_label_values(&[&self.config.id, error_kind(&error)])
						.inc();
				}
				tracing::error!(
					error = %error,
					metadata = ?self.metadata(),
					"Provider call failed"
				);
				error
			})
	}
}
