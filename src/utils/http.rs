//! Retryable HTTP clients shared by the RPC transport and the webhook callback.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
	policies::ExponentialBackoff, Jitter, RetryTransientMiddleware, RetryableStrategy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_retries() -> u32 {
	3
}

fn default_initial_backoff() -> Duration {
	Duration::from_millis(250)
}

fn default_max_backoff() -> Duration {
	Duration::from_secs(10)
}

fn default_base_for_backoff() -> u32 {
	2
}

/// Jitter applied to the HTTP retry backoff
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JitterSetting {
	None,
	#[default]
	Full,
}

/// Transport level retry policy for outgoing HTTP requests.
///
/// This sits below the scanner's own fetch retry: it only covers connection
/// failures and 5xx responses of a single request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
	/// Maximum number of retries for one request
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Exponential base
	#[serde(default = "default_base_for_backoff")]
	pub base_for_backoff: u32,
	/// Delay before the first retry
	#[serde(default = "default_initial_backoff")]
	pub initial_backoff: Duration,
	/// Upper bound of a single delay
	#[serde(default = "default_max_backoff")]
	pub max_backoff: Duration,
	#[serde(default)]
	pub jitter: JitterSetting,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: default_max_retries(),
			base_for_backoff: default_base_for_backoff(),
			initial_backoff: default_initial_backoff(),
			max_backoff: default_max_backoff(),
			jitter: JitterSetting::default(),
		}
	}
}

/// Wraps `base_client` with a [`RetryTransientMiddleware`] built from `config`.
///
/// When `custom_strategy` is given it decides which responses are retried,
/// otherwise reqwest-retry's default transient classification applies.
pub fn create_retryable_http_client<S>(
	config: &RetryConfig,
	base_client: reqwest::Client,
	custom_strategy: Option<S>,
) -> ClientWithMiddleware
where
	S: RetryableStrategy + Send + Sync + 'static,
{
	let jitter = match config.jitter {
		JitterSetting::None => Jitter::None,
		JitterSetting::Full => Jitter::Full,
	};

	let retry_policy = ExponentialBackoff::builder()
		.jitter(jitter)
		.base(config.base_for_backoff)
		.retry_bounds(config.initial_backoff, config.max_backoff)
		.build_with_max_retries(config.max_retries);

	let builder = ClientBuilder::new(base_client);
	match custom_strategy {
		Some(strategy) => builder.with(RetryTransientMiddleware::new_with_policy_and_strategy(
			retry_policy,
			strategy,
		)),
		None => builder.with(RetryTransientMiddleware::new_with_policy(retry_policy)),
	}
	.build()
}
