//! File spool for listener creation requests.
//!
//! Producers drop `*.json` creation requests into the queue directory. Each
//! poll claims a request by moving it into `processing/` before the listener
//! is created, so a request is turned into at most one listener even if its
//! file cannot be cleaned up afterwards. Requests that cannot be parsed or are
//! rejected as invalid end up in `failed/`; requests that fail for other
//! reasons are moved back and retried on the next poll.

use async_trait::async_trait;
use glob::glob;
use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	time::Duration,
};
use thiserror::Error as ThisError;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
	models::{ConfigLoader, ListenerRequest, ListenerResponse, QueueConfig},
	services::{
		callback::EventCallback,
		chain::ChainReader,
		checkpoint::CheckpointStore,
		listener::{ListenerError, ListenerManager},
	},
	utils::logging::error::{ErrorContext, TraceableError},
};

const FAILED_DIR: &str = "failed";
const PROCESSING_DIR: &str = "processing";

/// Errors of the request queue itself, not of individual requests
#[derive(ThisError, Debug)]
pub enum QueueError {
	/// The queue directory could not be listed or modified
	#[error("Storage error: {0}")]
	StorageError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl QueueError {
	pub fn storage_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::StorageError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for QueueError {
	fn trace_id(&self) -> String {
		match self {
			Self::StorageError(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}

/// Whatever turns a creation request into a running listener
#[async_trait]
pub trait RequestHandler: Send + Sync {
	async fn handle(&self, request: ListenerRequest) -> Result<ListenerResponse, ListenerError>;
}

#[async_trait]
impl<R, S, C> RequestHandler for ListenerManager<R, S, C>
where
	R: ChainReader + ?Sized + 'static,
	S: CheckpointStore + ?Sized + 'static,
	C: EventCallback + ?Sized + 'static,
{
	async fn handle(&self, request: ListenerRequest) -> Result<ListenerResponse, ListenerError> {
		self.create_from_request(request).await
	}
}

/// Counts of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
	pub created: usize,
	pub rejected: usize,
	pub deferred: usize,
}

#[derive(Debug, Clone)]
pub struct FileRequestQueue {
	path: PathBuf,
	poll_interval: Duration,
}

impl FileRequestQueue {
	pub fn new(config: &QueueConfig) -> Self {
		Self {
			path: config.path.clone(),
			poll_interval: config.poll_interval(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn failed_dir(&self) -> PathBuf {
		self.path.join(FAILED_DIR)
	}

	fn processing_dir(&self) -> PathBuf {
		self.path.join(PROCESSING_DIR)
	}

	fn pending(&self) -> Result<Vec<PathBuf>, QueueError> {
		if !self.path.exists() {
			return Ok(Vec::new());
		}

		let pattern = self.path.join("*.json").to_string_lossy().to_string();
		let entries = glob(&pattern).map_err(|e| {
			QueueError::storage_error("Invalid queue path", Some(Box::new(e)), None)
		})?;

		let mut files: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
		files.sort();
		Ok(files)
	}

	/// Moves `file` into `dir` and returns its new path.
	async fn move_into(&self, file: &Path, dir: &Path, action: &str) -> Result<PathBuf, QueueError> {
		let metadata = || {
			Some(HashMap::from([(
				"path".to_string(),
				file.display().to_string(),
			)]))
		};

		tokio::fs::create_dir_all(dir).await.map_err(|e| {
			QueueError::storage_error(
				format!("Failed to create {} directory", dir.display()),
				Some(Box::new(e)),
				metadata(),
			)
		})?;

		let Some(name) = file.file_name() else {
			return Err(QueueError::storage_error("Request path has no file name", None, metadata()));
		};
		let target = dir.join(name);
		tokio::fs::rename(file, &target).await.map_err(|e| {
			QueueError::storage_error(format!("Failed to {} request", action), Some(Box::new(e)), metadata())
		})?;
		Ok(target)
	}

	async fn reject(&self, file: &Path) -> Result<(), QueueError> {
		self.move_into(file, &self.failed_dir(), "reject").await.map(|_| ())
	}

	/// Processes every pending request once.
	pub async fn poll_once<H: RequestHandler + ?Sized>(
		&self,
		handler: &H,
	) -> Result<PollReport, QueueError> {
		let mut report = PollReport::default();

		for queued in self.pending()? {
			// once claimed the request is out of the queue, a retry can only
			// happen by moving it back
			let file = self.move_into(&queued, &self.processing_dir(), "claim").await?;

			let request = match ListenerRequest::load_from_path(&file).await {
				Ok(request) => request,
				Err(e) => {
					tracing::warn!(file = %file.display(), error = %e, "Rejecting unreadable request");
					self.reject(&file).await?;
					report.rejected += 1;
					continue;
				}
			};

			match handler.handle(request).await {
				Ok(response) => {
					tracing::info!(
						file = %queued.display(),
						listener_id = %response.listener_id,
						"Listener created from queued request"
					);
					report.created += 1;
					if let Err(e) = tokio::fs::remove_file(&file).await {
						tracing::warn!(
							file = %file.display(),
							listener_id = %response.listener_id,
							error = %e,
							"Failed to remove processed request, it will not be processed again"
						);
					}
				}
				Err(e @ ListenerError::InvalidRequest(_)) => {
					tracing::warn!(file = %file.display(), error = %e, "Rejecting invalid request");
					self.reject(&file).await?;
					report.rejected += 1;
				}
				Err(e) => {
					tracing::warn!(file = %queued.display(), error = %e, "Request deferred to next poll");
					self.move_into(&file, &self.path, "requeue").await?;
					report.deferred += 1;
				}
			}
		}

		Ok(report)
	}

	/// Polls until `shutdown` turns true.
	pub async fn run<H: RequestHandler + ?Sized>(&self, handler: &H, mut shutdown: watch::Receiver<bool>) {
		tracing::info!(path = %self.path.display(), "Watching request queue");
		let mut interval = tokio::time::interval(self.poll_interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				_ = interval.tick() => {}
				_ = shutdown.changed() => {}
			}
			if *shutdown.borrow() {
				break;
			}

			if let Err(e) = self.poll_once(handler).await {
				tracing::error!(error = %e, "Request queue poll failed");
			}
		}
		tracing::info!("Request queue stopped");
	}
}
