//! JSON-RPC over HTTP with fallback endpoint rotation.
//!
//! Requests go to the active endpoint. A rate-limit response or a network error
//! rotates to the next fallback (after a connectivity probe) and the request is
//! re-sent there. When no fallback is left the original error is returned.

use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{
	default_on_request_failure, default_on_request_success, Retryable, RetryableStrategy,
};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::{
	services::chain::TransportError,
	utils::http::{create_retryable_http_client, RetryConfig},
};

/// HTTP status codes that trigger endpoint rotation
pub const ROTATE_ON_ERROR_CODES: [u16; 1] = [429];

/// Middleware retry strategy for RPC calls.
///
/// Rate-limit responses are handed back immediately so that rotation and the
/// scanner's own backoff handle them; everything else follows reqwest-retry's
/// default transient classification.
pub struct RpcRetryStrategy;

impl RetryableStrategy for RpcRetryStrategy {
	fn handle(
		&self,
		res: &Result<reqwest::Response, reqwest_middleware::Error>,
	) -> Option<Retryable> {
		match res {
			Ok(response) if ROTATE_ON_ERROR_CODES.contains(&response.status().as_u16()) => None,
			Ok(response) => default_on_request_success(response),
			Err(error) => default_on_request_failure(error),
		}
	}
}

enum AttemptOutcome {
	Response(reqwest::Response),
	Network(reqwest_middleware::Error),
}

/// JSON-RPC client for one chain
#[derive(Clone, Debug)]
pub struct RpcTransport {
	client: ClientWithMiddleware,
	active_url: Arc<RwLock<String>>,
	fallback_urls: Arc<RwLock<Vec<String>>>,
	rotation_lock: Arc<Mutex<()>>,
}

impl RpcTransport {
	/// Builds a transport whose first url is active and the rest are fallbacks.
	pub fn new(rpc_urls: &[String], retry_config: &RetryConfig) -> Result<Self, TransportError> {
		let mut urls = Vec::with_capacity(rpc_urls.len());
		for raw in rpc_urls {
			let url = Url::parse(raw).map_err(|e| {
				TransportError::url_rotation(
					format!("Invalid RPC url '{}'", raw),
					Some(Box::new(e)),
					None,
				)
			})?;
			urls.push(url.as_str().trim_end_matches('/').to_string());
		}

		let Some((active, fallbacks)) = urls.split_first() else {
			return Err(TransportError::url_rotation(
				"At least one RPC url is required",
				None,
				None,
			));
		};

		let base_client = reqwest::ClientBuilder::new()
			.pool_idle_timeout(Duration::from_secs(90))
			.pool_max_idle_per_host(32)
			.timeout(Duration::from_secs(30))
			.connect_timeout(Duration::from_secs(20))
			.build()
			.map_err(|e| {
				TransportError::network("Failed to create HTTP client", Some(Box::new(e)), None)
			})?;

		let client =
			create_retryable_http_client(retry_config, base_client, Some(RpcRetryStrategy));

		Ok(Self {
			client,
			active_url: Arc::new(RwLock::new(active.clone())),
			fallback_urls: Arc::new(RwLock::new(fallbacks.to_vec())),
			rotation_lock: Arc::new(Mutex::new(())),
		})
	}

	pub async fn current_url(&self) -> String {
		self.active_url.read().await.clone()
	}

	fn request_body(method: &str, params: &Value) -> Value {
		json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params,
		})
	}

	async fn attempt(&self, url: &str, body: &str) -> AttemptOutcome {
		match self
			.client
			.post(url)
			.header("Content-Type", "application/json")
			.body(body.to_string())
			.send()
			.await
		{
			Ok(response) => AttemptOutcome::Response(response),
			Err(e) => AttemptOutcome::Network(e),
		}
	}

	async fn try_connect(&self, url: &str) -> Result<(), anyhow::Error> {
		let probe = Self::request_body("eth_chainId", &json!([]));
		let response = self
			.client
			.post(url)
			.json(&probe)
			.send()
			.await
			.map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;

		if response.status().is_success() {
			Ok(())
		} else {
			Err(anyhow::anyhow!(
				"Failed to connect to {}: {}",
				url,
				response.status().as_u16()
			))
		}
	}

	/// Makes the first reachable fallback active and demotes the current url.
	pub async fn try_rotate_url(&self) -> Result<String, TransportError> {
		let _guard = self.rotation_lock.lock().await;
		let current = self.active_url.read().await.clone();
		let fallbacks = self.fallback_urls.read().await.clone();

		let mut last_error = None;
		for candidate in fallbacks.iter().filter(|url| **url != current) {
			match self.try_connect(candidate).await {
				Ok(()) => {
					let mut active = self.active_url.write().await;
					let mut fallback_guard = self.fallback_urls.write().await;
					let mut next: Vec<String> = fallback_guard
						.iter()
						.filter(|url| *url != candidate)
						.cloned()
						.collect();
					next.push(current.clone());
					*fallback_guard = next;
					*active = candidate.clone();

					tracing::info!(from = %current, to = %candidate, "Rotated RPC endpoint");
					return Ok(candidate.clone());
				}
				Err(e) => {
					tracing::debug!(url = %candidate, error = %e, "Fallback endpoint unreachable");
					last_error = Some(e);
				}
			}
		}

		Err(TransportError::url_rotation(
			format!("No usable fallback URL. Current active: '{}'", current),
			last_error.map(|e| e.into()),
			Some(HashMap::from([(
				"fallbacks".to_string(),
				fallbacks.len().to_string(),
			)])),
		))
	}

	async fn rotate_bounded(
		&self,
		rotations: &mut usize,
		limit: usize,
	) -> Result<String, TransportError> {
		if *rotations >= limit {
			return Err(TransportError::url_rotation(
				"Every RPC endpoint failed this request",
				None,
				None,
			));
		}
		*rotations += 1;
		self.try_rotate_url().await
	}

	/// Sends a JSON-RPC request and returns the decoded response body.
	///
	/// The body may still carry a JSON-RPC `error` object; interpreting it is
	/// left to the caller.
	pub async fn send_raw_request(
		&self,
		method: &str,
		params: Value,
	) -> Result<Value, TransportError> {
		let body = serde_json::to_string(&Self::request_body(method, &params)).map_err(|e| {
			TransportError::request_serialization(
				"Failed to serialize request JSON",
				Some(Box::new(e)),
				None,
			)
		})?;

		// every endpoint gets at most one try per request
		let rotation_limit = self.fallback_urls.read().await.len();
		let mut rotations = 0;

		loop {
			let url = self.current_url().await;

			match self.attempt(&url, &body).await {
				AttemptOutcome::Response(response) => {
					let status = response.status();
					if status.is_success() {
						return response.json().await.map_err(|e| {
							TransportError::response_parse(
								"Failed to parse JSON response",
								Some(Box::new(e)),
								Some(HashMap::from([("method".to_string(), method.to_string())])),
							)
						});
					}

					let error_body = response.text().await.unwrap_or_default();
					if !ROTATE_ON_ERROR_CODES.contains(&status.as_u16()) {
						return Err(TransportError::http(status, url, error_body, None, None));
					}

					tracing::warn!(url = %url, status = %status, "RPC endpoint rate limited");
					match self.rotate_bounded(&mut rotations, rotation_limit).await {
						Ok(_) => continue,
						Err(rotation_error) => {
							return Err(TransportError::http(
								status,
								url,
								error_body,
								Some(Box::new(rotation_error)),
								None,
							))
						}
					}
				}
				AttemptOutcome::Network(network_error) => {
					tracing::warn!(url = %url, error = %network_error, "RPC network error");
					match self.rotate_bounded(&mut rotations, rotation_limit).await {
						Ok(_) => continue,
						Err(rotation_error) => {
							return Err(TransportError::network(
								network_error.to_string(),
								Some(Box::new(rotation_error)),
								None,
							))
						}
					}
				}
			}
		}
	}
}
