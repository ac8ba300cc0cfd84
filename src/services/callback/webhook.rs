//! Webhook delivery of matched events.
//!
//! The body is `{ listener_id, delivery_id, correlation, event }`. Every request
//! carries `x-idempotency-key: <delivery_id>`; when the listener has a secret the
//! body is HMAC-SHA256 signed over `<json><timestamp_ms>` and sent with
//! `x-signature` and `x-timestamp`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use sha2::Sha256;
use std::{collections::HashMap, sync::Arc};

use crate::{
	models::{ListenerConfig, LogEvent},
	services::callback::CallbackError,
};

type HmacSha256 = Hmac<Sha256>;

/// JSON body posted to the callback url
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
	pub listener_id: &'a str,
	pub delivery_id: String,
	pub correlation: &'a HashMap<String, String>,
	pub event: &'a LogEvent,
}

/// Signs `payload` with `secret`; returns the hex signature and the timestamp used.
pub fn sign_payload(secret: &str, payload: &serde_json::Value) -> Result<(String, String), CallbackError> {
	// Hmac accepts empty keys, an empty secret is a configuration mistake
	if secret.is_empty() {
		return Err(CallbackError::config_error(
			"Invalid secret: cannot be empty",
			None,
			None,
		));
	}

	let timestamp = Utc::now().timestamp_millis();
	let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
		CallbackError::config_error(format!("Invalid secret: {}", e), None, None)
	})?;

	let serialized = serde_json::to_string(payload).map_err(|e| {
		CallbackError::config_error("Failed to serialize payload", Some(Box::new(e)), None)
	})?;
	mac.update(format!("{}{}", serialized, timestamp).as_bytes());

	Ok((hex::encode(mac.finalize().into_bytes()), timestamp.to_string()))
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue, CallbackError> {
	HeaderValue::from_str(value).map_err(|e| {
		CallbackError::config_error(format!("Invalid {} value", name), Some(Box::new(e)), None)
	})
}

/// Posts events to webhook urls
#[derive(Debug, Clone)]
pub struct WebhookCallback {
	client: Arc<ClientWithMiddleware>,
}

impl WebhookCallback {
	pub fn new(client: Arc<ClientWithMiddleware>) -> Self {
		Self { client }
	}

	pub async fn deliver(
		&self,
		url: &str,
		secret: Option<&str>,
		config: &ListenerConfig,
		event: &LogEvent,
	) -> Result<(), CallbackError> {
		let delivery_id = event.delivery_id(&config.id);
		let metadata = HashMap::from([
			("listener_id".to_string(), config.id.clone()),
			("delivery_id".to_string(), delivery_id.clone()),
		]);

		let payload = serde_json::to_value(WebhookPayload {
			listener_id: &config.id,
			delivery_id: delivery_id.clone(),
			correlation: &config.callback.correlation,
			event,
		})
		.map_err(|e| {
			CallbackError::config_error(
				"Failed to serialize payload",
				Some(Box::new(e)),
				Some(metadata.clone()),
			)
		})?;

		let mut headers = HeaderMap::new();
		headers.insert(
			HeaderName::from_static("content-type"),
			HeaderValue::from_static("application/json"),
		);
		headers.insert(
			HeaderName::from_static("x-idempotency-key"),
			header_value(&delivery_id, "idempotency key")?,
		);

		if let Some(secret) = secret {
			let (signature, timestamp) = sign_payload(secret, &payload)?;
			headers.insert(
				HeaderName::from_static("x-signature"),
				header_value(&signature, "signature")?,
			);
			headers.insert(
				HeaderName::from_static("x-timestamp"),
				header_value(&timestamp, "timestamp")?,
			);
		}

		let response = self
			.client
			.post(url)
			.headers(headers)
			.json(&payload)
			.send()
			.await
			.map_err(|e| {
				CallbackError::network_error(
					format!("Failed to send webhook request: {}", e),
					Some(Box::new(e)),
					Some(metadata.clone()),
				)
			})?;

		let status = response.status();
		if !status.is_success() {
			return Err(CallbackError::delivery_failed(
				format!("Webhook request failed with status: {}", status),
				None,
				Some(metadata),
			));
		}

		Ok(())
	}
}
