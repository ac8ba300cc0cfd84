//! Test helper utilities for listener configuration
//!
//! - `ListenerConfigBuilder`: Builder for creating test ListenerConfig instances

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{
	AddressMatcher, CallbackRef, CallbackTarget, EventFilter, ListenerConfig, ListenerFilter,
};

/// USDC on mainnet, used as the default watched contract
pub const TEST_CONTRACT: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

/// Builder for creating test ListenerConfig instances
pub struct ListenerConfigBuilder {
	id: String,
	chain_id: u64,
	contract_address: String,
	event: EventFilter,
	persistent: bool,
	start_block: Option<u64>,
	timeout_ms: Option<u64>,
	created_at: DateTime<Utc>,
	target: CallbackTarget,
	correlation: HashMap<String, String>,
}

impl Default for ListenerConfigBuilder {
	fn default() -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			chain_id: 1,
			contract_address: TEST_CONTRACT.to_string(),
			event: EventFilter::Transfer {
				from: None,
				to: None,
			},
			persistent: true,
			start_block: None,
			timeout_ms: None,
			created_at: Utc::now(),
			target: CallbackTarget::Log,
			correlation: HashMap::new(),
		}
	}
}

impl ListenerConfigBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn id(mut self, id: &str) -> Self {
		self.id = id.to_string();
		self
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn contract_address(mut self, address: &str) -> Self {
		self.contract_address = address.to_string();
		self
	}

	pub fn transfer(mut self, from: Option<AddressMatcher>, to: Option<AddressMatcher>) -> Self {
		self.event = EventFilter::Transfer { from, to };
		self
	}

	pub fn approval(
		mut self,
		owner: Option<AddressMatcher>,
		spender: Option<AddressMatcher>,
	) -> Self {
		self.event = EventFilter::Approval { owner, spender };
		self
	}

	pub fn persistent(mut self, persistent: bool) -> Self {
		self.persistent = persistent;
		self
	}

	pub fn start_block(mut self, block: u64) -> Self {
		self.start_block = Some(block);
		self
	}

	pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.timeout_ms = Some(timeout_ms);
		self
	}

	pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
		self.created_at = created_at;
		self
	}

	pub fn webhook(mut self, url: &str, secret: Option<&str>) -> Self {
		self.target = CallbackTarget::Webhook {
			url: url.to_string(),
			secret: secret.map(str::to_string),
		};
		self
	}

	pub fn correlation(mut self, key: &str, value: &str) -> Self {
		self.correlation.insert(key.to_string(), value.to_string());
		self
	}

	pub fn build(self) -> ListenerConfig {
		ListenerConfig {
			id: self.id,
			chain_id: self.chain_id,
			filter: ListenerFilter {
				contract_address: self.contract_address,
				event: self.event,
			},
			persistent: self.persistent,
			start_block: self.start_block,
			timeout_ms: self.timeout_ms,
			created_at: self.created_at,
			callback: CallbackRef {
				target: self.target,
				correlation: self.correlation,
			},
		}
	}
}
