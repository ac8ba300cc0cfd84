use serde::{Deserialize, Serialize};

/// Decoded arguments of a matched log. `value` is the uint256 amount in decimal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum DecodedEvent {
	Transfer {
		from: String,
		to: String,
		value: String,
	},
	Approval {
		owner: String,
		spender: String,
		value: String,
	},
}

impl DecodedEvent {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Transfer { .. } => "Transfer",
			Self::Approval { .. } => "Approval",
		}
	}
}

/// A log matched by a listener's filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
	pub chain_id: u64,
	pub block_number: u64,
	pub transaction_hash: String,
	pub log_index: u64,
	/// Emitting contract
	pub address: String,
	pub event: DecodedEvent,
}

impl LogEvent {
	/// Idempotency key for downstream consumers.
	///
	/// Rescanning a range after a crash yields the same key for the same log.
	pub fn delivery_id(&self, listener_id: &str) -> String {
		format!(
			"{}:{}:{}",
			listener_id,
			self.transaction_hash.to_lowercase(),
			self.log_index
		)
	}
}
