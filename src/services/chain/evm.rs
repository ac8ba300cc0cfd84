//! EVM chain reader over JSON-RPC.
//!
//! Builds `eth_getLogs` topic filters from the listener filter and decodes the
//! returned ERC-20 `Transfer`/`Approval` logs: the two indexed addresses come
//! from `topics[1..3]`, the amount from the first 32-byte word of `data`.

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, str::FromStr};
use tracing::instrument;

use crate::{
	models::{AddressMatcher, ChainConfig, DecodedEvent, EventFilter, ListenerFilter, LogEvent},
	services::chain::{ChainReader, ChainReaderError, RpcTransport, TransportError},
	utils::{parse_hex_u64, RetryConfig},
};

/// JSON-RPC error code used by several providers for request throttling
const RPC_LIMIT_EXCEEDED: i64 = -32005;

const RATE_LIMIT_MARKERS: [&str; 3] = ["rate limit", "too many requests", "exceeded the quota"];

const RANGE_MARKERS: [&str; 5] = [
	"block range",
	"range too large",
	"query returned more than",
	"response size",
	"too many results",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
	address: String,
	topics: Vec<String>,
	data: String,
	block_number: Option<String>,
	transaction_hash: Option<String>,
	log_index: Option<String>,
	#[serde(default)]
	removed: bool,
}

fn hex_string(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

/// `topics[0]` of the filtered event
pub fn event_topic(filter: &EventFilter) -> String {
	hex_string(keccak256(filter.signature().as_bytes()).as_slice())
}

/// Left-pads an address to a 32-byte topic.
fn address_topic(address: &str) -> Result<String, String> {
	let address = Address::from_str(address.trim())
		.map_err(|e| format!("invalid address '{}': {}", address, e))?;
	Ok(hex_string(B256::left_padding_from(address.as_slice()).as_slice()))
}

fn matcher_topic(matcher: Option<&AddressMatcher>) -> Result<Value, String> {
	match matcher {
		None => Ok(Value::Null),
		Some(AddressMatcher::One(address)) => Ok(Value::String(address_topic(address)?)),
		Some(AddressMatcher::AnyOf(addresses)) => addresses
			.iter()
			.map(|a| address_topic(a).map(Value::String))
			.collect::<Result<Vec<_>, _>>()
			.map(Value::Array),
	}
}

/// `eth_getLogs` filter object for a listener filter and block range.
pub fn build_log_filter(filter: &ListenerFilter, from_block: u64, to_block: u64) -> Result<Value, String> {
	let (first, second) = filter.event.indexed_matchers();
	Ok(json!({
		"address": filter.contract_address,
		"fromBlock": format!("0x{:x}", from_block),
		"toBlock": format!("0x{:x}", to_block),
		"topics": [event_topic(&filter.event), matcher_topic(first)?, matcher_topic(second)?],
	}))
}

fn topic_address(topic: &str) -> Result<String, String> {
	let word = B256::from_str(topic).map_err(|e| format!("invalid topic '{}': {}", topic, e))?;
	Ok(hex_string(Address::from_slice(&word[12..]).as_slice()))
}

fn decode_value(data: &str) -> Result<String, String> {
	let bytes = hex::decode(data.trim_start_matches("0x"))
		.map_err(|e| format!("invalid log data: {}", e))?;
	if bytes.len() < 32 {
		return Err(format!("log data too short: {} bytes", bytes.len()));
	}
	Ok(U256::from_be_slice(&bytes[..32]).to_string())
}

/// Decodes one log, returning `None` for logs that are not ERC-20 events of the
/// filtered kind (ERC-721 transfers share the signature but index a third topic).
fn decode_log(chain_id: u64, filter: &ListenerFilter, log: RpcLog) -> Result<Option<LogEvent>, String> {
	if log.removed || log.topics.len() != 3 {
		return Ok(None);
	}
	if !log.topics[0].eq_ignore_ascii_case(&event_topic(&filter.event)) {
		return Ok(None);
	}

	let (Some(block_number), Some(transaction_hash), Some(log_index)) =
		(log.block_number, log.transaction_hash, log.log_index)
	else {
		// pending log
		return Ok(None);
	};

	let first = topic_address(&log.topics[1])?;
	let second = topic_address(&log.topics[2])?;

	let (first_matcher, second_matcher) = filter.event.indexed_matchers();
	if first_matcher.is_some_and(|m| !m.matches(&first))
		|| second_matcher.is_some_and(|m| !m.matches(&second))
	{
		return Ok(None);
	}

	let value = decode_value(&log.data)?;
	let event = match filter.event {
		EventFilter::Transfer { .. } => DecodedEvent::Transfer {
			from: first,
			to: second,
			value,
		},
		EventFilter::Approval { .. } => DecodedEvent::Approval {
			owner: first,
			spender: second,
			value,
		},
	};

	Ok(Some(LogEvent {
		chain_id,
		block_number: parse_hex_u64(&block_number)?,
		transaction_hash: transaction_hash.to_lowercase(),
		log_index: parse_hex_u64(&log_index)?,
		address: log.address.to_lowercase(),
		event,
	}))
}

fn contains_any(message: &str, markers: &[&str]) -> bool {
	let message = message.to_lowercase();
	markers.iter().any(|marker| message.contains(marker))
}

/// Maps a JSON-RPC error object onto the reader's error classes.
pub fn classify_rpc_error(
	code: i64,
	message: &str,
	metadata: HashMap<String, String>,
) -> ChainReaderError {
	let msg = format!("RPC error {}: {}", code, message);
	if code == RPC_LIMIT_EXCEEDED || contains_any(message, &RATE_LIMIT_MARKERS) {
		ChainReaderError::rate_limited(msg, None, Some(metadata))
	} else if contains_any(message, &RANGE_MARKERS) {
		ChainReaderError::range_too_large(msg, None, Some(metadata))
	} else {
		ChainReaderError::request_error(msg, None, Some(metadata))
	}
}

fn classify_transport_error(
	error: TransportError,
	metadata: HashMap<String, String>,
) -> ChainReaderError {
	if error.is_rate_limited() {
		return ChainReaderError::rate_limited(
			"Provider rate limited the request",
			Some(Box::new(error)),
			Some(metadata),
		);
	}
	if let TransportError::Http { body, .. } = &error {
		if contains_any(body, &RANGE_MARKERS) {
			let msg = format!("Provider rejected the range: {}", body);
			return ChainReaderError::range_too_large(msg, Some(Box::new(error)), Some(metadata));
		}
	}
	ChainReaderError::request_error("RPC request failed", Some(Box::new(error)), Some(metadata))
}

/// [`ChainReader`] for EVM chains, one transport per chain id
#[derive(Clone, Debug)]
pub struct EvmChainReader {
	transports: HashMap<u64, RpcTransport>,
}

impl EvmChainReader {
	pub fn new(chains: &[ChainConfig], retry_config: &RetryConfig) -> Result<Self, TransportError> {
		let mut transports = HashMap::new();
		for chain in chains {
			transports.insert(chain.chain_id, RpcTransport::new(&chain.rpc_urls, retry_config)?);
		}
		Ok(Self { transports })
	}

	pub fn from_transports(transports: HashMap<u64, RpcTransport>) -> Self {
		Self { transports }
	}

	fn transport(&self, chain_id: u64) -> Result<&RpcTransport, ChainReaderError> {
		self.transports.get(&chain_id).ok_or_else(|| {
			ChainReaderError::unsupported_chain(
				format!("No RPC endpoints configured for chain {}", chain_id),
				None,
				None,
			)
		})
	}

	async fn call(
		&self,
		chain_id: u64,
		method: &str,
		params: Value,
		metadata: HashMap<String, String>,
	) -> Result<Value, ChainReaderError> {
		let response = self
			.transport(chain_id)?
			.send_raw_request(method, params)
			.await
			.map_err(|e| classify_transport_error(e, metadata.clone()))?;

		if let Some(error) = response.get("error") {
			let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
			let message = error
				.get("message")
				.and_then(Value::as_str)
				.unwrap_or("unknown error");
			return Err(classify_rpc_error(code, message, metadata));
		}

		response.get("result").cloned().ok_or_else(|| {
			ChainReaderError::request_error("Missing 'result' field", None, Some(metadata))
		})
	}
}

#[async_trait]
impl ChainReader for EvmChainReader {
	#[instrument(skip(self))]
	async fn current_block_height(&self, chain_id: u64) -> Result<u64, ChainReaderError> {
		let metadata = HashMap::from([("chain_id".to_string(), chain_id.to_string())]);
		let result = self
			.call(chain_id, "eth_blockNumber", json!([]), metadata.clone())
			.await?;

		result
			.as_str()
			.ok_or_else(|| "result is not a string".to_string())
			.and_then(parse_hex_u64)
			.map_err(|e| {
				ChainReaderError::request_error(
					format!("Failed to parse block number: {}", e),
					None,
					Some(metadata),
				)
			})
	}

	#[instrument(skip(self, filter), fields(contract = %filter.contract_address))]
	async fn get_logs(
		&self,
		chain_id: u64,
		filter: &ListenerFilter,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<LogEvent>, ChainReaderError> {
		let metadata = HashMap::from([
			("chain_id".to_string(), chain_id.to_string()),
			("from_block".to_string(), from_block.to_string()),
			("to_block".to_string(), to_block.to_string()),
		]);

		let log_filter = build_log_filter(filter, from_block, to_block).map_err(|e| {
			ChainReaderError::request_error(e, None, Some(metadata.clone()))
		})?;

		let result = self
			.call(chain_id, "eth_getLogs", json!([log_filter]), metadata.clone())
			.await?;

		let logs: Vec<RpcLog> = serde_json::from_value(result).map_err(|e| {
			ChainReaderError::request_error(
				"Failed to parse logs",
				Some(Box::new(e)),
				Some(metadata.clone()),
			)
		})?;

		let mut events = Vec::with_capacity(logs.len());
		for log in logs {
			match decode_log(chain_id, filter, log) {
				Ok(Some(event)) => events.push(event),
				Ok(None) => {}
				Err(e) => {
					return Err(ChainReaderError::request_error(
						format!("Failed to decode log: {}", e),
						None,
						Some(metadata),
					))
				}
			}
		}
		events.sort_by_key(|e| (e.block_number, e.log_index));
		Ok(events)
	}
}
