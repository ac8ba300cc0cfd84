//! Small parsing helpers used by the CLI and the request models.

use byte_unit::Byte;
use std::str::FromStr;

/// Parses a human readable size ("1GB", "500MiB", ...) into bytes.
pub fn parse_string_to_bytes_size(s: &str) -> Result<u64, String> {
	Byte::from_str(s)
		.map(|byte| byte.as_u64())
		.map_err(|e| format!("Invalid size format: '{}'. Error: {}", s, e))
}

/// Trims and lowercases `input`.
pub fn normalize_string(input: &str) -> String {
	input.trim().to_lowercase()
}

/// Parses a `0x`-prefixed (or bare) hex quantity as returned by JSON-RPC nodes.
pub fn parse_hex_u64(value: &str) -> Result<u64, String> {
	let digits = value.trim().trim_start_matches("0x");
	if digits.is_empty() {
		return Err(format!("Empty hex quantity: '{}'", value));
	}
	u64::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex quantity '{}': {}", value, e))
}
