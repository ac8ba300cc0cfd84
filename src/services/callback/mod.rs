//! Downstream delivery of matched events.
//!
//! The processor hands every event to an [`EventCallback`]. [`CallbackRouter`]
//! is the production implementation: it dispatches on the listener's
//! [`CallbackTarget`] to a webhook or to the log.

mod error;
mod webhook;

pub use error::CallbackError;
pub use webhook::{sign_payload, WebhookCallback, WebhookPayload};

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::DefaultRetryableStrategy;
use std::sync::Arc;

use crate::{
	models::{CallbackTarget, ListenerConfig, LogEvent},
	utils::http::{create_retryable_http_client, RetryConfig},
};

/// Receives matched events. Implementations must tolerate redelivery of the
/// same `delivery_id`.
#[async_trait]
pub trait EventCallback: Send + Sync {
	async fn on_event(&self, config: &ListenerConfig, event: &LogEvent)
		-> Result<(), CallbackError>;
}

/// Routes events to the target configured on each listener
#[derive(Debug, Clone)]
pub struct CallbackRouter {
	webhook: WebhookCallback,
}

impl CallbackRouter {
	pub fn new(client: Arc<ClientWithMiddleware>) -> Self {
		Self {
			webhook: WebhookCallback::new(client),
		}
	}

	/// Builds the router with its own retrying HTTP client.
	pub fn from_retry_config(retry_config: &RetryConfig) -> Self {
		let client = create_retryable_http_client::<DefaultRetryableStrategy>(
			retry_config,
			reqwest::Client::new(),
			None,
		);
		Self::new(Arc::new(client))
	}
}

#[async_trait]
impl EventCallback for CallbackRouter {
	async fn on_event(
		&self,
		config: &ListenerConfig,
		event: &LogEvent,
	) -> Result<(), CallbackError> {
		match &config.callback.target {
			CallbackTarget::Webhook { url, secret } => {
				self.webhook
					.deliver(url, secret.as_deref(), config, event)
					.await
			}
			CallbackTarget::Log => {
				tracing::info!(
					listener_id = %config.id,
					delivery_id = %event.delivery_id(&config.id),
					event = %event.event.name(),
					block = event.block_number,
					correlation = ?config.callback.correlation,
					"Event matched"
				);
				Ok(())
			}
		}
	}
}
