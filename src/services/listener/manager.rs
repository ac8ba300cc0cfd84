//! Listener registry and lifecycle.
//!
//! [`ListenerManager`] owns every running listener. Each listener is a chain of
//! four tasks sharing one [`EventBuffer`]:
//!
//! ```text
//! BlockScanner --push--> EventBuffer --recv--> EventProcessor --try_send--> MetricsSink
//! ```
//!
//! Scanner and processor report terminal outcomes (timeout, provider failure,
//! one-shot completion) to a supervisor task, which tears the chain down,
//! deletes the persisted record and broadcasts a [`ListenerNotification`].

use futures::future::join_all;
use std::{
	collections::{HashMap, VecDeque},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, Weak,
	},
};
use tokio::{
	sync::{broadcast, mpsc, watch, RwLock},
	task::JoinHandle,
};

use crate::{
	models::{
		listener_id_from_key, listener_key, ListenerConfig, ListenerRecord, ListenerRequest,
		ListenerResponse, ListenerStatus, ScannerConfig,
	},
	services::{
		callback::EventCallback,
		chain::ChainReader,
		checkpoint::CheckpointStore,
		listener::{
			buffer::EventBuffer,
			error::ListenerError,
			processor::{EventProcessor, ProcessorExit},
			scanner::{BlockScanner, ScanSettings, TickOutcome},
			sink::MetricsSink,
		},
	},
	utils::metrics::{forget_listener, ACTIVE_LISTENERS},
};

/// Terminal statuses kept for [`ListenerManager::status`]
const HISTORY_LIMIT: usize = 1024;

const NOTIFICATION_CAPACITY: usize = 256;

/// Construction parameters of a [`ListenerManager`]
#[derive(Debug, Clone, Default)]
pub struct ManagerSettings {
	pub scanner: ScannerConfig,
	/// Confirmation depth per chain id; chains not listed scan up to the head
	pub confirmations: HashMap<u64, u64>,
}

/// Broadcast when a listener reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerNotification {
	/// `matched` is false when the listener timed out without a match
	Completed { listener_id: String, matched: bool },
	Failed { listener_id: String, reason: String },
	Stopped { listener_id: String },
}

impl ListenerNotification {
	pub fn listener_id(&self) -> &str {
		match self {
			Self::Completed { listener_id, .. }
			| Self::Failed { listener_id, .. }
			| Self::Stopped { listener_id } => listener_id,
		}
	}
}

/// Outcome of [`ListenerManager::restore_listeners`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
	pub restored: Vec<String>,
	pub failed: Vec<String>,
}

// Sent by listener tasks to the supervisor
#[derive(Debug)]
enum Lifecycle {
	Completed { listener_id: String, matched: bool },
	Failed { listener_id: String, reason: String },
}

struct ListenerHandle {
	config: Arc<ListenerConfig>,
	cancel: watch::Sender<bool>,
	buffer: Arc<EventBuffer>,
	scanner: JoinHandle<()>,
	processor: JoinHandle<()>,
	sink: JoinHandle<u64>,
}

impl ListenerHandle {
	/// Stops the chain front to back: the scanner first so nothing new enters
	/// the buffer, then the processor drains what is left, then the sink.
	async fn shutdown(self) {
		let id = &self.config.id;
		self.cancel.send_replace(true);

		if let Err(e) = self.scanner.await {
			tracing::warn!(listener_id = %id, error = %e, "Scanner task ended abnormally");
		}

		self.buffer.close();
		if let Err(e) = self.processor.await {
			tracing::warn!(listener_id = %id, error = %e, "Processor task ended abnormally");
		}

		// the processor owned the only sink sender
		match self.sink.await {
			Ok(processed) => {
				tracing::debug!(listener_id = %id, processed, "Listener pipeline drained")
			}
			Err(e) => {
				tracing::warn!(listener_id = %id, error = %e, "Metrics sink ended abnormally")
			}
		}
	}
}

enum Slot {
	/// Id claimed by a creation that is still persisting its record
	Reserved,
	Running(ListenerHandle),
}

struct Inner<R: ?Sized, S: ?Sized, C: ?Sized> {
	reader: Arc<R>,
	store: Arc<S>,
	callback: Arc<C>,
	settings: ManagerSettings,
	registry: RwLock<HashMap<String, Slot>>,
	history: Mutex<VecDeque<(String, ListenerStatus)>>,
	notifications: broadcast::Sender<ListenerNotification>,
	lifecycle: mpsc::UnboundedSender<Lifecycle>,
	shutting_down: AtomicBool,
}

/// Registry of running listeners.
///
/// Cheap to clone; clones share the same registry.
pub struct ListenerManager<R: ?Sized, S: ?Sized, C: ?Sized> {
	inner: Arc<Inner<R, S, C>>,
}

impl<R: ?Sized, S: ?Sized, C: ?Sized> Clone for ListenerManager<R, S, C> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<R, S, C> ListenerManager<R, S, C>
where
	R: ChainReader + ?Sized + 'static,
	S: CheckpointStore + ?Sized + 'static,
	C: EventCallback + ?Sized + 'static,
{
	/// Creates the manager and its supervisor task. Must be called from
	/// within a tokio runtime.
	pub fn new(reader: Arc<R>, store: Arc<S>, callback: Arc<C>, settings: ManagerSettings) -> Self {
		let (lifecycle, lifecycle_rx) = mpsc::unbounded_channel();
		let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

		let inner = Arc::new(Inner {
			reader,
			store,
			callback,
			settings,
			registry: RwLock::new(HashMap::new()),
			history: Mutex::new(VecDeque::new()),
			notifications,
			lifecycle,
			shutting_down: AtomicBool::new(false),
		});

		tokio::spawn(Self::supervise(Arc::downgrade(&inner), lifecycle_rx));

		Self { inner }
	}

	async fn supervise(inner: Weak<Inner<R, S, C>>, mut lifecycle: mpsc::UnboundedReceiver<Lifecycle>) {
		while let Some(message) = lifecycle.recv().await {
			let Some(inner) = inner.upgrade() else {
				break;
			};
			let manager = Self { inner };

			// teardown joins the listener's tasks, keep it off the supervisor loop
			tokio::spawn(async move {
				match message {
					Lifecycle::Completed {
						listener_id,
						matched,
					} => {
						manager
							.terminate(
								&listener_id,
								ListenerStatus::Completed,
								ListenerNotification::Completed {
									listener_id: listener_id.clone(),
									matched,
								},
							)
							.await;
					}
					Lifecycle::Failed {
						listener_id,
						reason,
					} => {
						manager
							.terminate(
								&listener_id,
								ListenerStatus::Failed {
									reason: reason.clone(),
								},
								ListenerNotification::Failed {
									listener_id: listener_id.clone(),
									reason,
								},
							)
							.await;
					}
				}
			});
		}
	}

	/// Persists `config` and starts its pipeline.
	///
	/// Fails with [`ListenerError::AlreadyExists`] while a listener with the
	/// same id is running or being created.
	pub async fn create_listener(&self, config: ListenerConfig) -> Result<String, ListenerError> {
		let id = config.id.clone();
		let chain_id = config.chain_id;
		let metadata = HashMap::from([("listener_id".to_string(), id.clone())]);

		if self.inner.shutting_down.load(Ordering::Acquire) {
			return Err(ListenerError::invalid_request(
				"listener manager is shutting down",
				None,
				Some(metadata),
			));
		}

		config.validate().map_err(|e| {
			ListenerError::invalid_request(
				"invalid listener configuration",
				Some(e.into()),
				Some(metadata.clone()),
			)
		})?;

		self.reserve(&id).await?;

		let record = ListenerRecord::new(config);
		if let Err(e) = self.inner.store.set(&listener_key(&id), &record).await {
			self.release(&id).await;
			return Err(ListenerError::persistence_error(
				"Failed to persist listener",
				Some(e.into()),
				Some(metadata),
			));
		}

		self.start(record).await;
		tracing::info!(
			listener_id = %id,
			chain_id,
			"Listener created"
		);
		Ok(id)
	}

	/// Builds a configuration from a creation request and starts it.
	pub async fn create_from_request(
		&self,
		request: ListenerRequest,
	) -> Result<ListenerResponse, ListenerError> {
		let config = request.into_config().map_err(|e| {
			ListenerError::invalid_request("invalid listener request", Some(e.into()), None)
		})?;
		let listener_id = self.create_listener(config).await?;
		Ok(ListenerResponse { listener_id })
	}

	/// Tears the listener down and deletes its record. Unknown ids succeed.
	pub async fn stop_listener(&self, listener_id: &str) -> Result<(), ListenerError> {
		let stopped = self
			.terminate(
				listener_id,
				ListenerStatus::Stopped,
				ListenerNotification::Stopped {
					listener_id: listener_id.to_string(),
				},
			)
			.await;

		if !stopped {
			// not running here, but a persisted record may still exist
			self.inner
				.store
				.delete(&listener_key(listener_id))
				.await
				.map_err(|e| {
					ListenerError::persistence_error(
						"Failed to delete listener record",
						Some(e.into()),
						Some(HashMap::from([(
							"listener_id".to_string(),
							listener_id.to_string(),
						)])),
					)
				})?;
		}

		Ok(())
	}

	/// Restarts every persisted listener from its checkpoint.
	///
	/// Listeners that cannot be restored are reported and skipped.
	pub async fn restore_listeners(&self) -> Result<RestoreReport, ListenerError> {
		let keys = self.inner.store.list_keys().await.map_err(|e| {
			ListenerError::persistence_error("Failed to list listener records", Some(e.into()), None)
		})?;

		let mut report = RestoreReport::default();
		for key in keys {
			let Some(listener_id) = listener_id_from_key(&key) else {
				tracing::debug!(key = %key, "Skipping foreign key");
				continue;
			};

			match self.restore_one(&key, listener_id).await {
				Ok(()) => report.restored.push(listener_id.to_string()),
				Err(e) => {
					tracing::warn!(listener_id = %listener_id, error = %e, "Failed to restore listener");
					report.failed.push(listener_id.to_string());
				}
			}
		}

		tracing::info!(
			restored = report.restored.len(),
			failed = report.failed.len(),
			"Listener restore finished"
		);
		Ok(report)
	}

	async fn restore_one(&self, key: &str, listener_id: &str) -> Result<(), ListenerError> {
		let metadata = HashMap::from([("listener_id".to_string(), listener_id.to_string())]);

		let record = self
			.inner
			.store
			.get(key)
			.await
			.map_err(|e| {
				ListenerError::persistence_error(
					"Failed to read listener record",
					Some(e.into()),
					Some(metadata.clone()),
				)
			})?
			.ok_or_else(|| {
				ListenerError::not_found("listener record disappeared", None, Some(metadata.clone()))
			})?;

		if record.config.id != listener_id {
			return Err(ListenerError::invalid_request(
				format!("record id '{}' does not match its key", record.config.id),
				None,
				Some(metadata),
			));
		}
		record.config.validate().map_err(|e| {
			ListenerError::invalid_request("invalid stored configuration", Some(e.into()), Some(metadata))
		})?;

		self.reserve(listener_id).await?;
		tracing::info!(
			listener_id = %listener_id,
			next_block = ?record.next_block(),
			"Restoring listener"
		);
		self.start(record).await;
		Ok(())
	}

	/// Stops every listener and waits for all pipelines to drain.
	///
	/// Records are kept so the listeners resume on the next start.
	pub async fn shutdown(&self) {
		self.inner.shutting_down.store(true, Ordering::Release);

		let handles: Vec<ListenerHandle> = {
			let mut registry = self.inner.registry.write().await;
			let ids: Vec<String> = registry
				.iter()
				.filter(|(_, slot)| matches!(slot, Slot::Running(_)))
				.map(|(id, _)| id.clone())
				.collect();
			ids.into_iter()
				.filter_map(|id| match registry.remove(&id) {
					Some(Slot::Running(handle)) => Some(handle),
					_ => None,
				})
				.collect()
		};

		tracing::info!(listeners = handles.len(), "Shutting down listeners");

		join_all(handles.into_iter().map(|handle| async move {
			let id = handle.config.id.clone();
			handle.shutdown().await;
			self.finish(&id, ListenerStatus::Stopped);
		}))
		.await;
	}

	/// Current status, or the terminal status of a recently ended listener
	pub async fn status(&self, listener_id: &str) -> Option<ListenerStatus> {
		if let Some(Slot::Running(_)) = self.inner.registry.read().await.get(listener_id) {
			return Some(ListenerStatus::Active);
		}

		self.history()
			.iter()
			.rev()
			.find(|(id, _)| id == listener_id)
			.map(|(_, status)| status.clone())
	}

	/// Ids of running listeners, sorted
	pub async fn active_listeners(&self) -> Vec<String> {
		let registry = self.inner.registry.read().await;
		let mut ids: Vec<String> = registry
			.iter()
			.filter(|(_, slot)| matches!(slot, Slot::Running(_)))
			.map(|(id, _)| id.clone())
			.collect();
		ids.sort();
		ids
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ListenerNotification> {
		self.inner.notifications.subscribe()
	}

	fn history(&self) -> std::sync::MutexGuard<'_, VecDeque<(String, ListenerStatus)>> {
		self.inner
			.history
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	async fn reserve(&self, listener_id: &str) -> Result<(), ListenerError> {
		let mut registry = self.inner.registry.write().await;
		if registry.contains_key(listener_id) {
			return Err(ListenerError::already_exists(
				format!("listener '{}' is already registered", listener_id),
				None,
				Some(HashMap::from([(
					"listener_id".to_string(),
					listener_id.to_string(),
				)])),
			));
		}
		registry.insert(listener_id.to_string(), Slot::Reserved);
		Ok(())
	}

	async fn release(&self, listener_id: &str) {
		let mut registry = self.inner.registry.write().await;
		if matches!(registry.get(listener_id), Some(Slot::Reserved)) {
			registry.remove(listener_id);
		}
	}

	/// Spawns the pipeline of `record` and replaces its reservation.
	async fn start(&self, record: ListenerRecord) {
		let inner = &self.inner;
		let next_block = record.next_block();
		let config = Arc::new(record.config);
		let id = config.id.clone();

		let confirmations = inner
			.settings
			.confirmations
			.get(&config.chain_id)
			.copied()
			.unwrap_or(0);
		let settings = ScanSettings::new(&inner.settings.scanner, confirmations);
		let buffer = Arc::new(EventBuffer::new(inner.settings.scanner.buffer_capacity));
		let (cancel, cancel_rx) = watch::channel(false);
		let (sink_tx, sink_rx) = MetricsSink::channel(inner.settings.scanner.sink_capacity);

		// tasks are spawned under the write lock so a lifecycle message can
		// never observe the reservation instead of the running handle
		let mut registry = inner.registry.write().await;

		let sink = tokio::spawn(MetricsSink::new(id.clone()).run(sink_rx));

		let processor = EventProcessor::new(
			config.clone(),
			inner.callback.clone(),
			buffer.clone(),
			sink_tx,
		);
		let lifecycle = inner.lifecycle.clone();
		let processor_id = id.clone();
		let processor = tokio::spawn(async move {
			if processor.run().await == ProcessorExit::Completed {
				let _ = lifecycle.send(Lifecycle::Completed {
					listener_id: processor_id,
					matched: true,
				});
			}
		});

		let scanner = BlockScanner::new(
			config.clone(),
			next_block,
			inner.reader.clone(),
			inner.store.clone(),
			buffer.clone(),
			settings,
			cancel_rx,
		);
		let lifecycle = inner.lifecycle.clone();
		let scanner_id = id.clone();
		let scanner = tokio::spawn(async move {
			let message = match scanner.run().await {
				TickOutcome::TimedOut => Lifecycle::Completed {
					listener_id: scanner_id,
					matched: false,
				},
				TickOutcome::Failed(reason) => Lifecycle::Failed {
					listener_id: scanner_id,
					reason,
				},
				// a match completes through the processor once delivered
				_ => return,
			};
			let _ = lifecycle.send(message);
		});

		registry.insert(
			id,
			Slot::Running(ListenerHandle {
				config,
				cancel,
				buffer,
				scanner,
				processor,
				sink,
			}),
		);
		ACTIVE_LISTENERS.inc();
	}

	/// Removes a running listener, tears it down and deletes its record.
	///
	/// Returns `false` when the listener was not running.
	async fn terminate(
		&self,
		listener_id: &str,
		status: ListenerStatus,
		notification: ListenerNotification,
	) -> bool {
		let handle = {
			let mut registry = self.inner.registry.write().await;
			match registry.remove(listener_id) {
				Some(Slot::Running(handle)) => handle,
				Some(Slot::Reserved) => {
					registry.insert(listener_id.to_string(), Slot::Reserved);
					return false;
				}
				None => return false,
			}
		};

		handle.shutdown().await;

		if let Err(e) = self.inner.store.delete(&listener_key(listener_id)).await {
			tracing::error!(
				listener_id = %listener_id,
				error = %e,
				"Failed to delete record of terminated listener"
			);
		}

		match &status {
			ListenerStatus::Failed { reason } => {
				tracing::error!(listener_id = %listener_id, reason = %reason, "Listener failed")
			}
			status => tracing::info!(listener_id = %listener_id, status = ?status, "Listener ended"),
		}

		self.finish(listener_id, status);
		// no subscribers is fine
		let _ = self.inner.notifications.send(notification);
		true
	}

	fn finish(&self, listener_id: &str, status: ListenerStatus) {
		ACTIVE_LISTENERS.dec();
		forget_listener(listener_id);

		let mut history = self.history();
		if history.len() >= HISTORY_LIMIT {
			history.pop_front();
		}
		history.push_back((listener_id.to_string(), status));
	}
}
