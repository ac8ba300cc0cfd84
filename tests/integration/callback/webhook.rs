use std::sync::Arc;

use chain_listener::{
	services::callback::{CallbackError, CallbackRouter, EventCallback, WebhookCallback},
	utils::{
		create_retryable_http_client,
		tests::builders::{event::LogEventBuilder, listener::ListenerConfigBuilder},
	},
};
use mockito::{Matcher, Server};
use reqwest_retry::DefaultRetryableStrategy;
use serde_json::json;

use crate::integration::mocks::no_retry;

fn webhook_callback() -> WebhookCallback {
	let client = create_retryable_http_client::<DefaultRetryableStrategy>(
		&no_retry(),
		reqwest::Client::new(),
		None,
	);
	WebhookCallback::new(Arc::new(client))
}

#[tokio::test]
async fn test_unsigned_delivery_has_idempotency_key_only() {
	let mut server = Server::new_async().await;
	let config = ListenerConfigBuilder::new()
		.webhook(&server.url(), None)
		.build();
	let event = LogEventBuilder::new().log_index(4).build();
	let delivery_id = event.delivery_id(&config.id);

	let mock = server
		.mock("POST", "/")
		.match_header("content-type", "application/json")
		.match_header("x-idempotency-key", delivery_id.as_str())
		.match_header("x-signature", Matcher::Missing)
		.match_body(Matcher::PartialJson(json!({
			"listener_id": config.id,
			"delivery_id": delivery_id,
			"event": { "log_index": 4 }
		})))
		.with_status(204)
		.create_async()
		.await;

	let router = CallbackRouter::from_retry_config(&no_retry());
	router.on_event(&config, &event).await.unwrap();
	mock.assert_async().await;
}

#[tokio::test]
async fn test_redelivery_reuses_idempotency_key() {
	let mut server = Server::new_async().await;
	let config = ListenerConfigBuilder::new().build();
	let event = LogEventBuilder::new().build();

	let mock = server
		.mock("POST", "/hook")
		.match_header("x-idempotency-key", event.delivery_id(&config.id).as_str())
		.with_status(200)
		.expect(2)
		.create_async()
		.await;

	let callback = webhook_callback();
	let url = format!("{}/hook", server.url());
	callback.deliver(&url, Some("k"), &config, &event).await.unwrap();
	callback.deliver(&url, Some("k"), &config, &event).await.unwrap();
	mock.assert_async().await;
}

#[tokio::test]
async fn test_non_success_status_is_delivery_failure() {
	let mut server = Server::new_async().await;
	let mock = server
		.mock("POST", "/")
		.with_status(503)
		.create_async()
		.await;

	let config = ListenerConfigBuilder::new().build();
	let event = LogEventBuilder::new().build();
	let result = webhook_callback()
		.deliver(&server.url(), None, &config, &event)
		.await;

	assert!(matches!(result, Err(CallbackError::DeliveryFailed(_))));
	mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
	let config = ListenerConfigBuilder::new().build();
	let event = LogEventBuilder::new().build();
	let result = webhook_callback()
		.deliver("http://127.0.0.1:1", None, &config, &event)
		.await;

	assert!(matches!(result, Err(CallbackError::NetworkError(_))));
}

#[tokio::test]
async fn test_empty_secret_is_rejected_before_sending() {
	let mut server = Server::new_async().await;
	let mock = server.mock("POST", "/").expect(0).create_async().await;

	let config = ListenerConfigBuilder::new().build();
	let event = LogEventBuilder::new().build();
	let result = webhook_callback()
		.deliver(&server.url(), Some(""), &config, &event)
		.await;

	assert!(matches!(result, Err(CallbackError::ConfigError(_))));
	mock.assert_async().await;
}
