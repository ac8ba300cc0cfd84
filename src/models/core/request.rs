use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
	models::{
		AddressMatcher, CallbackRef, ConfigError, EventFilter, ListenerConfig, ListenerFilter,
	},
	utils::normalize_string,
};

/// Argument matchers of a creation request.
///
/// For `Approval` requests `from` is the owner and `to` the spender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterArgs {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from: Option<AddressMatcher>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<AddressMatcher>,
}

/// Request to create a listener, as received from the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListenerRequest {
	pub event_name: String,
	pub chain_id: u64,
	pub filter_address: String,
	#[serde(default)]
	pub filter_args: FilterArgs,
	pub persistent: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
	pub callback_ref: CallbackRef,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_block: Option<u64>,
}

/// Reply to a creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerResponse {
	pub listener_id: String,
}

impl ListenerRequest {
	fn event_filter(&self) -> Result<EventFilter, ConfigError> {
		let FilterArgs { from, to } = self.filter_args.clone();
		match normalize_string(&self.event_name).as_str() {
			"transfer" => Ok(EventFilter::Transfer { from, to }),
			"approval" => Ok(EventFilter::Approval {
				owner: from,
				spender: to,
			}),
			_ => Err(ConfigError::validation_error(
				format!("unsupported event '{}'", self.event_name),
				None,
				Some(HashMap::from([(
					"supported".to_string(),
					"Transfer, Approval".to_string(),
				)])),
			)),
		}
	}

	/// Builds a validated [`ListenerConfig`] with a fresh id and creation time.
	pub fn into_config(self) -> Result<ListenerConfig, ConfigError> {
		let filter = ListenerFilter {
			contract_address: self.filter_address.clone(),
			event: self.event_filter()?,
		}
		.normalized()
		.map_err(|e| ConfigError::validation_error(e, None, None))?;

		let config = ListenerConfig {
			id: Uuid::new_v4().to_string(),
			chain_id: self.chain_id,
			filter,
			persistent: self.persistent,
			start_block: self.start_block,
			timeout_ms: self.timeout_ms,
			created_at: Utc::now(),
			callback: self.callback_ref,
		};
		config.validate()?;
		Ok(config)
	}
}
