//! Prometheus metrics for the listener pipeline.
//!
//! All metrics live in the global [`REGISTRY`] and are exposed by the optional
//! metrics server in [`server`].

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
	Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

lazy_static! {
	/// Global Prometheus registry.
	pub static ref REGISTRY: Registry = Registry::new();

	/// Events delivered to a callback, across all listeners.
	pub static ref EVENTS_TOTAL: IntCounter = {
		let counter = IntCounter::new("listener_events_total", "Total number of processed events").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Processed events by decoded event type (`Transfer`, `Approval`).
	pub static ref EVENTS_BY_TYPE: IntCounterVec = {
		let counter = IntCounterVec::new(
			Opts::new("listener_events_by_type_total", "Processed events by event type"),
			&["event_type"],
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Processed events by listener id.
	pub static ref EVENTS_BY_LISTENER: IntCounterVec = {
		let counter = IntCounterVec::new(
			Opts::new("listener_events_by_listener_total", "Processed events by listener"),
			&["listener_id"],
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Events dropped because the listener's buffer was full.
	pub static ref EVENTS_DROPPED: IntCounterVec = {
		let counter = IntCounterVec::new(
			Opts::new("listener_events_dropped_total", "Events dropped on a full buffer"),
			&["listener_id"],
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Callback invocations that returned an error or panicked.
	pub static ref CALLBACK_ERRORS: IntCounterVec = {
		let counter = IntCounterVec::new(
			Opts::new("listener_callback_errors_total", "Failed callback invocations"),
			&["listener_id"],
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Failed fetch attempts and checkpoint writes seen by scanners.
	pub static ref SCANNER_ERRORS: IntCounterVec = {
		let counter = IntCounterVec::new(
			Opts::new("listener_scanner_errors_total", "Scanner errors by kind"),
			&["listener_id", "kind"],
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Listeners currently registered with the manager.
	pub static ref ACTIVE_LISTENERS: IntGauge = {
		let gauge = IntGauge::new("listener_active", "Number of active listeners").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Last persisted checkpoint per listener.
	pub static ref LISTENER_CHECKPOINT: IntGaugeVec = {
		let gauge = IntGaugeVec::new(
			Opts::new("listener_checkpoint_block", "Last fully scanned block per listener"),
			&["listener_id"],
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Events processed in the trailing minute per listener.
	pub static ref EVENTS_PER_MINUTE: IntGaugeVec = {
		let gauge = IntGaugeVec::new(
			Opts::new("listener_events_per_minute", "Events processed in the last minute"),
			&["listener_id"],
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};
}

/// Removes every per-listener series once a listener is torn down.
pub fn forget_listener(listener_id: &str) {
	let _ = EVENTS_BY_LISTENER.remove_label_values(&[listener_id]);
	let _ = EVENTS_DROPPED.remove_label_values(&[listener_id]);
	let _ = CALLBACK_ERRORS.remove_label_values(&[listener_id]);
	let _ = LISTENER_CHECKPOINT.remove_label_values(&[listener_id]);
	let _ = EVENTS_PER_MINUTE.remove_label_values(&[listener_id]);
}

/// Encodes the registry in the Prometheus text format.
pub fn gather_metrics() -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
	let encoder = TextEncoder::new();
	let metric_families = REGISTRY.gather();
	let mut buffer = Vec::new();
	encoder.encode(&metric_families, &mut buffer)?;
	Ok(buffer)
}
