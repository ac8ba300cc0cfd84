//! Event processor of a listener.
//!
//! Drains the listener's [`EventBuffer`], hands each event to the callback and
//! reports it to the metrics sink. Callback errors and panics are contained
//! here: the event is logged, counted and treated as delivered.

use futures::FutureExt;
use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::{
	models::{ListenerConfig, LogEvent},
	services::{
		callback::{CallbackError, EventCallback},
		listener::{buffer::EventBuffer, sink::ProcessedEvent},
	},
};

/// Why a processor stopped consuming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorExit {
	/// The buffer was closed and fully drained
	Drained,
	/// A one-shot listener delivered its event
	Completed,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic payload".to_string()
	}
}

pub struct EventProcessor<C: ?Sized> {
	config: Arc<ListenerConfig>,
	callback: Arc<C>,
	buffer: Arc<EventBuffer>,
	sink: mpsc::Sender<ProcessedEvent>,
}

impl<C: EventCallback + ?Sized> EventProcessor<C> {
	pub fn new(
		config: Arc<ListenerConfig>,
		callback: Arc<C>,
		buffer: Arc<EventBuffer>,
		sink: mpsc::Sender<ProcessedEvent>,
	) -> Self {
		Self {
			config,
			callback,
			buffer,
			sink,
		}
	}

	#[instrument(skip_all, fields(listener_id = %self.config.id))]
	pub async fn run(self) -> ProcessorExit {
		while let Some(event) = self.buffer.recv().await {
			self.process(event).await;

			if !self.config.persistent {
				tracing::info!("One-shot listener delivered its event");
				return ProcessorExit::Completed;
			}
		}
		ProcessorExit::Drained
	}

	/// Delivers one event; returns whether the callback failed.
	pub async fn process(&self, event: LogEvent) -> bool {
		let delivery_id = event.delivery_id(&self.config.id);

		let result = AssertUnwindSafe(self.callback.on_event(&self.config, &event))
			.catch_unwind()
			.await
			.unwrap_or_else(|panic| {
				Err(CallbackError::panicked(
					panic_message(panic.as_ref()),
					None,
					Some(HashMap::from([
						("listener_id".to_string(), self.config.id.clone()),
						("delivery_id".to_string(), delivery_id.clone()),
					])),
				))
			});

		let callback_failed = match result {
			Ok(()) => {
				tracing::debug!(delivery_id = %delivery_id, "Event delivered");
				false
			}
			Err(error) => {
				tracing::warn!(
					delivery_id = %delivery_id,
					error = %error,
					"Callback failed, event counted as delivered"
				);
				true
			}
		};

		let report = ProcessedEvent {
			event_type: event.event.name(),
			callback_failed,
		};
		if let Err(e) = self.sink.try_send(report) {
			tracing::debug!(error = %e, "Metrics sink unavailable, sample dropped");
		}

		callback_failed
	}
}
