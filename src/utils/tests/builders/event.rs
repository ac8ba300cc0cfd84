//! Test helper utilities for matched log events
//!
//! - `LogEventBuilder`: Builder for creating test LogEvent instances

use crate::{
	models::{DecodedEvent, LogEvent},
	utils::tests::builders::listener::TEST_CONTRACT,
};

/// Builder for creating test LogEvent instances
pub struct LogEventBuilder {
	chain_id: u64,
	block_number: u64,
	transaction_hash: String,
	log_index: u64,
	address: String,
	event: DecodedEvent,
}

impl Default for LogEventBuilder {
	fn default() -> Self {
		Self {
			chain_id: 1,
			block_number: 100,
			transaction_hash: format!("0x{}", "ab".repeat(32)),
			log_index: 0,
			address: TEST_CONTRACT.to_string(),
			event: DecodedEvent::Transfer {
				from: "0x0000000000000000000000000000000000000001".to_string(),
				to: "0x0000000000000000000000000000000000000002".to_string(),
				value: "1000".to_string(),
			},
		}
	}
}

impl LogEventBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn block_number(mut self, block_number: u64) -> Self {
		self.block_number = block_number;
		self
	}

	pub fn transaction_hash(mut self, hash: &str) -> Self {
		self.transaction_hash = hash.to_string();
		self
	}

	pub fn log_index(mut self, log_index: u64) -> Self {
		self.log_index = log_index;
		self
	}

	pub fn address(mut self, address: &str) -> Self {
		self.address = address.to_string();
		self
	}

	pub fn transfer(mut self, from: &str, to: &str, value: &str) -> Self {
		self.event = DecodedEvent::Transfer {
			from: from.to_string(),
			to: to.to_string(),
			value: value.to_string(),
		};
		self
	}

	pub fn approval(mut self, owner: &str, spender: &str, value: &str) -> Self {
		self.event = DecodedEvent::Approval {
			owner: owner.to_string(),
			spender: spender.to_string(),
			value: value.to_string(),
		};
		self
	}

	pub fn build(self) -> LogEvent {
		LogEvent {
			chain_id: self.chain_id,
			block_number: self.block_number,
			transaction_hash: self.transaction_hash,
			log_index: self.log_index,
			address: self.address,
			event: self.event,
		}
	}
}
