//! Domain models and configuration.
//!
//! - `config`: service configuration and its loader
//! - `core`: listeners, filters, matched events and creation requests

mod config;
mod core;

pub use config::{
	ChainConfig, ConfigError, ConfigLoader, FetchRetryConfig, QueueConfig, ScannerConfig,
	ServiceConfig, StorageConfig,
};

pub use core::{
	listener_id_from_key, listener_key, normalize_address, AddressMatcher, CallbackRef,
	CallbackTarget, DecodedEvent, EventFilter, FilterArgs, ListenerConfig, ListenerFilter,
	ListenerRecord, ListenerRequest, ListenerResponse, ListenerStatus, LogEvent,
	LISTENER_KEY_PREFIX,
};
