use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
	collections::{HashMap, HashSet},
	path::{Path, PathBuf},
	time::Duration,
};

use crate::{
	models::config::{read_json, ConfigError, ConfigLoader},
	utils::RetryConfig,
};

/// RPC endpoints and confirmation depth of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
	pub chain_id: u64,

	/// Human-readable name, used in logs
	pub name: String,

	/// First entry is the primary endpoint, the rest are fallbacks
	pub rpc_urls: Vec<String>,

	/// Blocks behind the head that are considered final
	#[serde(default)]
	pub confirmation_blocks: u64,
}

/// Backoff applied by a scanner when a range fetch fails transiently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchRetryConfig {
	/// Total fetch attempts for one range, including the first
	#[serde(default = "default_max_attempts")]
	pub max_attempts: usize,

	/// Delay before the first retry; doubles on every further retry
	#[serde(default = "default_base_delay_ms")]
	pub base_delay_ms: u64,

	#[serde(default = "default_max_delay_ms")]
	pub max_delay_ms: u64,
}

fn default_max_attempts() -> usize {
	5
}

fn default_base_delay_ms() -> u64 {
	500
}

fn default_max_delay_ms() -> u64 {
	30_000
}

impl Default for FetchRetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: default_max_attempts(),
			base_delay_ms: default_base_delay_ms(),
			max_delay_ms: default_max_delay_ms(),
		}
	}
}

impl FetchRetryConfig {
	pub fn base_delay(&self) -> Duration {
		Duration::from_millis(self.base_delay_ms)
	}

	pub fn max_delay(&self) -> Duration {
		Duration::from_millis(self.max_delay_ms)
	}

	/// Delay before the last retry, before capping; `None` on overflow or
	/// when there are no retries.
	pub fn peak_delay_ms(&self) -> Option<u64> {
		let doublings = u32::try_from(self.max_attempts.checked_sub(2)?).ok()?;
		self.base_delay_ms.checked_mul(2u64.checked_pow(doublings)?)
	}

	/// Every retry has to wait strictly longer than the one before, so the
	/// doubling must never run into the cap.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let metadata = || {
			Some(HashMap::from([
				("max_attempts".to_string(), self.max_attempts.to_string()),
				("base_delay_ms".to_string(), self.base_delay_ms.to_string()),
				("max_delay_ms".to_string(), self.max_delay_ms.to_string()),
			]))
		};

		if self.max_attempts == 0 {
			return Err(ConfigError::validation_error(
				"scanner.retry.max_attempts must be at least 1",
				None,
				metadata(),
			));
		}
		if self.base_delay_ms == 0 {
			return Err(ConfigError::validation_error(
				"scanner.retry.base_delay_ms must be greater than zero",
				None,
				metadata(),
			));
		}
		if self.max_attempts >= 2 {
			match self.peak_delay_ms() {
				Some(peak) if peak <= self.max_delay_ms => {}
				_ => {
					return Err(ConfigError::validation_error(
						"scanner.retry.max_delay_ms is too small for base_delay_ms doubled over max_attempts",
						None,
						metadata(),
					));
				}
			}
		}
		Ok(())
	}
}

/// Per-listener pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerConfig {
	/// Blocks per `get_logs` range
	#[serde(default = "default_chunk_size")]
	pub chunk_size: u64,

	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,

	/// Event buffer capacity between scanner and processor
	#[serde(default = "default_buffer_capacity")]
	pub buffer_capacity: usize,

	/// How long a scanner waits for a paused buffer before ending its tick
	#[serde(default = "default_buffer_resume_wait_ms")]
	pub buffer_resume_wait_ms: u64,

	/// Capacity of the processor to metrics sink channel
	#[serde(default = "default_sink_capacity")]
	pub sink_capacity: usize,

	#[serde(default)]
	pub retry: FetchRetryConfig,
}

fn default_chunk_size() -> u64 {
	1_000
}

fn default_poll_interval_ms() -> u64 {
	5_000
}

fn default_buffer_capacity() -> usize {
	16
}

fn default_buffer_resume_wait_ms() -> u64 {
	1_000
}

fn default_sink_capacity() -> usize {
	256
}

impl Default for ScannerConfig {
	fn default() -> Self {
		Self {
			chunk_size: default_chunk_size(),
			poll_interval_ms: default_poll_interval_ms(),
			buffer_capacity: default_buffer_capacity(),
			buffer_resume_wait_ms: default_buffer_resume_wait_ms(),
			sink_capacity: default_sink_capacity(),
			retry: FetchRetryConfig::default(),
		}
	}
}

impl ScannerConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn buffer_resume_wait(&self) -> Duration {
		Duration::from_millis(self.buffer_resume_wait_ms)
	}
}

/// Backend of the checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum StorageConfig {
	File { path: PathBuf },
	Memory,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self::File {
			path: PathBuf::from("data"),
		}
	}
}

/// Spool directory polled for listener creation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
	pub path: PathBuf,

	#[serde(default = "default_queue_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

fn default_queue_poll_interval_ms() -> u64 {
	1_000
}

impl QueueConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}

/// Top-level service configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
	pub chains: Vec<ChainConfig>,

	#[serde(default)]
	pub scanner: ScannerConfig,

	#[serde(default)]
	pub storage: StorageConfig,

	/// Request queue; without it listeners are only restored, never created
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub queue: Option<QueueConfig>,

	/// Per-request retry policy of the RPC and webhook HTTP clients
	#[serde(default)]
	pub http_retry: RetryConfig,
}

impl ServiceConfig {
	pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
		self.chains.iter().find(|c| c.chain_id == chain_id)
	}

	/// Confirmation depth per chain id.
	pub fn confirmations(&self) -> HashMap<u64, u64> {
		self.chains
			.iter()
			.map(|c| (c.chain_id, c.confirmation_blocks))
			.collect()
	}
}

#[async_trait]
impl ConfigLoader for ServiceConfig {
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let config: Self = read_json(path).await?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.chains.is_empty() {
			return Err(ConfigError::validation_error(
				"at least one chain must be configured",
				None,
				None,
			));
		}

		let mut seen = HashSet::new();
		for chain in &self.chains {
			let metadata = Some(HashMap::from([(
				"chain_id".to_string(),
				chain.chain_id.to_string(),
			)]));
			if !seen.insert(chain.chain_id) {
				return Err(ConfigError::validation_error(
					"duplicate chain id",
					None,
					metadata,
				));
			}
			if chain.rpc_urls.is_empty() {
				return Err(ConfigError::validation_error(
					format!("chain '{}' has no rpc urls", chain.name),
					None,
					metadata,
				));
			}
			for url in &chain.rpc_urls {
				url::Url::parse(url).map_err(|e| {
					ConfigError::validation_error(
						format!("invalid rpc url '{}'", url),
						Some(Box::new(e)),
						metadata.clone(),
					)
				})?;
			}
		}

		let scanner = &self.scanner;
		if scanner.chunk_size == 0 {
			return Err(ConfigError::validation_error(
				"scanner.chunk_size must be greater than zero",
				None,
				None,
			));
		}
		if scanner.poll_interval_ms == 0 {
			return Err(ConfigError::validation_error(
				"scanner.poll_interval_ms must be greater than zero",
				None,
				None,
			));
		}
		if scanner.buffer_capacity == 0 || scanner.sink_capacity == 0 {
			return Err(ConfigError::validation_error(
				"scanner.buffer_capacity and scanner.sink_capacity must be greater than zero",
				None,
				None,
			));
		}
		scanner.retry.validate()?;

		Ok(())
	}
}
