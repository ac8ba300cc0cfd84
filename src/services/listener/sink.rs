//! Metrics sink of a listener.
//!
//! Runs as its own task behind a bounded channel. The processor only ever
//! `try_send`s into it, so a slow or dead sink loses samples instead of
//! slowing delivery. The per-minute rate is republished on a timer so it
//! decays to zero once events stop.

use std::{
	collections::VecDeque,
	time::{Duration, Instant},
};
use tokio::{sync::mpsc, time::MissedTickBehavior};

use crate::utils::metrics::{
	CALLBACK_ERRORS, EVENTS_BY_LISTENER, EVENTS_BY_TYPE, EVENTS_PER_MINUTE, EVENTS_TOTAL,
};

const WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_REFRESH: Duration = Duration::from_secs(5);

/// What the processor reports about each handled event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
	pub event_type: &'static str,
	/// The callback returned an error or panicked
	pub callback_failed: bool,
}

/// Counts processed events of one listener
#[derive(Debug)]
pub struct MetricsSink {
	listener_id: String,
	window: VecDeque<Instant>,
	processed: u64,
	refresh: Duration,
}

impl MetricsSink {
	pub fn new(listener_id: impl Into<String>) -> Self {
		Self {
			listener_id: listener_id.into(),
			window: VecDeque::new(),
			processed: 0,
			refresh: DEFAULT_REFRESH,
		}
	}

	/// How often [`run`](Self::run) republishes the rate without new events
	pub fn with_refresh_interval(mut self, refresh: Duration) -> Self {
		self.refresh = refresh;
		self
	}

	/// Bounded channel feeding a sink
	pub fn channel(capacity: usize) -> (mpsc::Sender<ProcessedEvent>, mpsc::Receiver<ProcessedEvent>) {
		mpsc::channel(capacity.max(1))
	}

	pub fn processed(&self) -> u64 {
		self.processed
	}

	/// Events recorded within the last minute before `now`
	pub fn events_per_minute(&mut self, now: Instant) -> usize {
		self.evict(now);
		self.window.len()
	}

	fn evict(&mut self, now: Instant) {
		while let Some(&oldest) = self.window.front() {
			if now.duration_since(oldest) >= WINDOW {
				self.window.pop_front();
			} else {
				break;
			}
		}
	}

	pub fn record(&mut self, event: &ProcessedEvent) {
		self.record_at(event, Instant::now());
	}

	pub fn record_at(&mut self, event: &ProcessedEvent, now: Instant) {
		self.processed += 1;
		EVENTS_TOTAL.inc();
		EVENTS_BY_TYPE.with_label_values(&[event.event_type]).inc();
		EVENTS_BY_LISTENER
			.with_label_values(&[&self.listener_id])
			.inc();
		if event.callback_failed {
			CALLBACK_ERRORS.with_label_values(&[&self.listener_id]).inc();
		}

		self.window.push_back(now);
		self.publish_rate(now);
	}

	fn publish_rate(&mut self, now: Instant) {
		let per_minute = self.events_per_minute(now);
		EVENTS_PER_MINUTE
			.with_label_values(&[&self.listener_id])
			.set(i64::try_from(per_minute).unwrap_or(i64::MAX));
	}

	/// Consumes reports until every sender is dropped; returns the total count.
	pub async fn run(mut self, mut receiver: mpsc::Receiver<ProcessedEvent>) -> u64 {
		let mut refresh = tokio::time::interval(self.refresh);
		refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				event = receiver.recv() => match event {
					Some(event) => self.record(&event),
					None => break,
				},
				_ = refresh.tick() => self.publish_rate(Instant::now()),
			}
		}
		tracing::debug!(
			listener_id = %self.listener_id,
			processed = self.processed,
			"Metrics sink closed"
		);
		self.processed
	}
}
