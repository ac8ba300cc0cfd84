use alloy::primitives::Address;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr};
use uuid::Uuid;

use crate::models::ConfigError;

/// Prefix of every listener record key in the checkpoint store
pub const LISTENER_KEY_PREFIX: &str = "listener:";

/// Store key of the record belonging to `listener_id`.
pub fn listener_key(listener_id: &str) -> String {
	format!("{}{}", LISTENER_KEY_PREFIX, listener_id)
}

/// Inverse of [`listener_key`]; `None` for keys owned by something else.
pub fn listener_id_from_key(key: &str) -> Option<&str> {
	key.strip_prefix(LISTENER_KEY_PREFIX)
		.filter(|id| !id.is_empty())
}

/// Parses an EVM address and returns its lowercase `0x` form.
pub fn normalize_address(value: &str) -> Result<String, String> {
	Address::from_str(value.trim())
		.map(|address| format!("0x{}", hex::encode(address.as_slice())))
		.map_err(|e| format!("invalid address '{}': {}", value, e))
}

/// Argument matcher for an indexed address parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressMatcher {
	One(String),
	AnyOf(Vec<String>),
}

impl AddressMatcher {
	pub fn addresses(&self) -> Vec<&str> {
		match self {
			Self::One(address) => vec![address.as_str()],
			Self::AnyOf(addresses) => addresses.iter().map(String::as_str).collect(),
		}
	}

	/// Case-insensitive comparison against a decoded address.
	pub fn matches(&self, address: &str) -> bool {
		self.addresses()
			.iter()
			.any(|candidate| candidate.eq_ignore_ascii_case(address))
	}

	fn normalized(&self) -> Result<Self, String> {
		match self {
			Self::One(address) => Ok(Self::One(normalize_address(address)?)),
			Self::AnyOf(addresses) if addresses.is_empty() => {
				Err("address set must not be empty".to_string())
			}
			Self::AnyOf(addresses) => addresses
				.iter()
				.map(|a| normalize_address(a))
				.collect::<Result<Vec<_>, _>>()
				.map(Self::AnyOf),
		}
	}
}

/// The watched event and its optional argument matchers.
///
/// Both supported events carry two indexed address parameters, so the matchers
/// map one-to-one on `topics[1]` and `topics[2]` of a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", deny_unknown_fields)]
pub enum EventFilter {
	Transfer {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		from: Option<AddressMatcher>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		to: Option<AddressMatcher>,
	},
	Approval {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		owner: Option<AddressMatcher>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		spender: Option<AddressMatcher>,
	},
}

impl EventFilter {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Transfer { .. } => "Transfer",
			Self::Approval { .. } => "Approval",
		}
	}

	/// Canonical Solidity signature used to derive `topics[0]`.
	pub fn signature(&self) -> &'static str {
		match self {
			Self::Transfer { .. } => "Transfer(address,address,uint256)",
			Self::Approval { .. } => "Approval(address,address,uint256)",
		}
	}

	/// Matchers for the first and second indexed parameter.
	pub fn indexed_matchers(&self) -> (Option<&AddressMatcher>, Option<&AddressMatcher>) {
		match self {
			Self::Transfer { from, to } => (from.as_ref(), to.as_ref()),
			Self::Approval { owner, spender } => (owner.as_ref(), spender.as_ref()),
		}
	}

	fn normalized(&self) -> Result<Self, String> {
		let norm = |m: &Option<AddressMatcher>| m.as_ref().map(|m| m.normalized()).transpose();
		Ok(match self {
			Self::Transfer { from, to } => Self::Transfer {
				from: norm(from)?,
				to: norm(to)?,
			},
			Self::Approval { owner, spender } => Self::Approval {
				owner: norm(owner)?,
				spender: norm(spender)?,
			},
		})
	}
}

/// Contract plus event filter of a listener. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerFilter {
	/// Address of the emitting contract
	pub contract_address: String,

	/// Event and argument matchers
	pub event: EventFilter,
}

impl ListenerFilter {
	/// Returns a copy with every address in lowercase `0x` form.
	pub fn normalized(&self) -> Result<Self, String> {
		Ok(Self {
			contract_address: normalize_address(&self.contract_address)?,
			event: self.event.normalized()?,
		})
	}
}

/// Where matched events are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum CallbackTarget {
	/// HTTP POST of the event, optionally HMAC signed with `secret`
	Webhook {
		url: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		secret: Option<String>,
	},
	/// Write matches to the log only
	Log,
}

/// Opaque callback reference carried with a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackRef {
	pub target: CallbackTarget,

	/// Data echoed back to the downstream consumer with every event
	#[serde(default)]
	pub correlation: HashMap<String, String>,
}

/// Configuration of a single listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
	/// UUID v4 assigned at creation
	pub id: String,

	/// Chain the filter applies to
	pub chain_id: u64,

	pub filter: ListenerFilter,

	/// One-shot listeners stop after their first delivered event
	pub persistent: bool,

	/// First block to scan; without it scanning starts one chunk behind the head
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_block: Option<u64>,

	/// Lifetime in milliseconds counted from `created_at`
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,

	pub created_at: DateTime<Utc>,

	pub callback: CallbackRef,
}

impl ListenerConfig {
	/// Wall-clock deadline, stable across restarts.
	pub fn deadline(&self) -> Option<DateTime<Utc>> {
		self.timeout_ms
			.and_then(|ms| i64::try_from(ms).ok())
			.map(|ms| self.created_at + ChronoDuration::milliseconds(ms))
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.deadline().is_some_and(|deadline| now >= deadline)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let metadata = || Some(HashMap::from([("listener_id".to_string(), self.id.clone())]));

		match Uuid::parse_str(&self.id) {
			Ok(uuid) if uuid.get_version_num() == 4 => {}
			_ => {
				return Err(ConfigError::validation_error(
					format!("listener id '{}' is not a UUID v4", self.id),
					None,
					metadata(),
				))
			}
		}

		self.filter
			.normalized()
			.map_err(|e| ConfigError::validation_error(e, None, metadata()))?;

		if self.timeout_ms == Some(0) {
			return Err(ConfigError::validation_error(
				"timeout_ms must be greater than zero",
				None,
				metadata(),
			));
		}

		if let CallbackTarget::Webhook { url, .. } = &self.callback.target {
			let parsed = url::Url::parse(url).map_err(|e| {
				ConfigError::validation_error(
					format!("invalid webhook url '{}'", url),
					Some(Box::new(e)),
					metadata(),
				)
			})?;
			if !matches!(parsed.scheme(), "http" | "https") {
				return Err(ConfigError::validation_error(
					format!("webhook url must use http or https, got '{}'", url),
					None,
					metadata(),
				));
			}
		}

		Ok(())
	}
}

/// Lifecycle state of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ListenerStatus {
	Active,
	Stopped,
	Failed { reason: String },
	Completed,
}

impl ListenerStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, Self::Active)
	}
}

/// Persisted form of a listener: its configuration and last fully scanned block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerRecord {
	pub config: ListenerConfig,
	#[serde(default)]
	pub checkpoint: Option<u64>,
}

impl ListenerRecord {
	pub fn new(config: ListenerConfig) -> Self {
		Self {
			config,
			checkpoint: None,
		}
	}

	/// First block the next scan covers, if it is known without asking the chain.
	pub fn next_block(&self) -> Option<u64> {
		match self.checkpoint {
			Some(checkpoint) => Some(checkpoint.saturating_add(1)),
			None => self.config.start_block,
		}
	}
}
