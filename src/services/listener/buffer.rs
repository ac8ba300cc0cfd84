//! Bounded queue between a listener's scanner and its processor.
//!
//! The buffer never blocks the producer. A push into a full buffer is rejected
//! and flips the flow state to [`FlowState::Paused`]; the scanner observes that
//! through [`EventBuffer::subscribe`] and holds off until the consumer has
//! drained the buffer below half its capacity.

use std::{
	collections::VecDeque,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex, MutexGuard,
	},
};
use tokio::sync::{watch, Notify};

use crate::models::LogEvent;

/// Producer-facing flow control signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
	Flowing,
	Paused,
}

#[derive(Debug, Default)]
struct BufferState {
	queue: VecDeque<LogEvent>,
	paused: bool,
	closed: bool,
}

/// Fixed-capacity single-consumer event queue with pause/resume signalling
#[derive(Debug)]
pub struct EventBuffer {
	capacity: usize,
	state: Mutex<BufferState>,
	notify: Notify,
	flow: watch::Sender<FlowState>,
	pause_signals: AtomicU64,
}

impl EventBuffer {
	/// Creates a buffer holding at most `capacity` events (at least one).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		let (flow, _) = watch::channel(FlowState::Flowing);
		Self {
			capacity,
			state: Mutex::new(BufferState {
				queue: VecDeque::with_capacity(capacity),
				..Default::default()
			}),
			notify: Notify::new(),
			flow,
			pause_signals: AtomicU64::new(0),
		}
	}

	// A poisoned lock only means another holder panicked between two plain
	// field writes, the queue itself is still consistent
	fn lock(&self) -> MutexGuard<'_, BufferState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().queue.is_empty()
	}

	pub fn is_closed(&self) -> bool {
		self.lock().closed
	}

	pub fn is_paused(&self) -> bool {
		self.lock().paused
	}

	/// Number of pause signals emitted over the buffer's lifetime
	pub fn pause_signal_count(&self) -> u64 {
		self.pause_signals.load(Ordering::Relaxed)
	}

	/// Receiver for flow state changes
	pub fn subscribe(&self) -> watch::Receiver<FlowState> {
		self.flow.subscribe()
	}

	/// Enqueues `event`.
	///
	/// Returns `false` when the buffer is full or closed. The first rejection
	/// of a paused period emits [`FlowState::Paused`].
	pub fn push(&self, event: LogEvent) -> bool {
		let mut state = self.lock();
		if state.closed {
			return false;
		}

		if state.queue.len() >= self.capacity {
			if !state.paused {
				state.paused = true;
				drop(state);
				self.pause_signals.fetch_add(1, Ordering::Relaxed);
				self.flow.send_replace(FlowState::Paused);
			}
			return false;
		}

		state.queue.push_back(event);
		drop(state);
		self.notify.notify_one();
		true
	}

	/// Dequeues the oldest event without waiting.
	pub fn pop(&self) -> Option<LogEvent> {
		let mut state = self.lock();
		let event = state.queue.pop_front()?;

		// resume once below half capacity
		if state.paused && state.queue.len() * 2 < self.capacity {
			state.paused = false;
			drop(state);
			self.flow.send_replace(FlowState::Flowing);
		}

		Some(event)
	}

	/// Waits for the next event; `None` once the buffer is closed and drained.
	pub async fn recv(&self) -> Option<LogEvent> {
		loop {
			let notified = self.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if let Some(event) = self.pop() {
				return Some(event);
			}
			if self.is_closed() {
				return None;
			}

			notified.await;
		}
	}

	/// Rejects further pushes and wakes the consumer so it can drain and exit.
	pub fn close(&self) {
		self.lock().closed = true;
		self.notify.notify_waiters();
	}
}
