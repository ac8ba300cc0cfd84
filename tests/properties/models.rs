use chain_listener::models::{
	normalize_address, AddressMatcher, CallbackRef, CallbackTarget, EventFilter, FilterArgs,
	ListenerRequest,
};
use proptest::{prelude::*, test_runner::Config};
use std::collections::HashMap;

use crate::properties::strategies::{address_strategy, filter_args_strategy, log_event_strategy};

fn lowered(matcher: Option<&AddressMatcher>) -> Option<Vec<String>> {
	matcher.map(|m| m.addresses().iter().map(|a| a.to_lowercase()).collect())
}

fn request(event_name: &str, filter_address: String, args: FilterArgs) -> ListenerRequest {
	ListenerRequest {
		event_name: event_name.to_string(),
		chain_id: 1,
		filter_address,
		filter_args: args,
		persistent: true,
		timeout_ms: None,
		callback_ref: CallbackRef {
			target: CallbackTarget::Log,
			correlation: HashMap::new(),
		},
		start_block: None,
	}
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_normalize_address_is_idempotent(address in address_strategy()) {
		let once = normalize_address(&address).unwrap();
		prop_assert_eq!(normalize_address(&once).unwrap(), once.clone());
		prop_assert_eq!(once, address.to_lowercase());
	}

	// Approval requests map from/to onto owner/spender
	#[test]
	fn test_request_argument_mapping(
		contract in address_strategy(),
		args in filter_args_strategy(),
		approval in any::<bool>(),
	) {
		let name = if approval { "approval" } else { "TRANSFER" };
		let config = request(name, contract.clone(), args.clone()).into_config().unwrap();

		prop_assert_eq!(config.filter.contract_address.clone(), contract.to_lowercase());
		prop_assert!(config.validate().is_ok());

		let (first, second) = config.filter.event.indexed_matchers();
		prop_assert_eq!(lowered(first), lowered(args.from.as_ref()));
		prop_assert_eq!(lowered(second), lowered(args.to.as_ref()));
		prop_assert_eq!(
			matches!(config.filter.event, EventFilter::Approval { .. }),
			approval
		);
	}

	// Redelivering the same log yields the same idempotency key
	#[test]
	fn test_delivery_id_identifies_log(event in log_event_strategy(), other in log_event_strategy()) {
		prop_assert_eq!(event.delivery_id("l"), event.clone().delivery_id("l"));
		if (&event.transaction_hash, event.log_index) != (&other.transaction_hash, other.log_index) {
			prop_assert_ne!(event.delivery_id("l"), other.delivery_id("l"));
		}
	}
}
