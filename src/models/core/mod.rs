//! Core domain models of the listener pipeline.
//!
//! - listener: filters, listener configuration, status and persisted record
//! - event: matched and decoded logs
//! - request: listener creation requests

mod event;
mod listener;
mod request;

pub use event::{DecodedEvent, LogEvent};
pub use listener::{
	listener_id_from_key, listener_key, normalize_address, AddressMatcher, CallbackRef,
	CallbackTarget, EventFilter, ListenerConfig, ListenerFilter, ListenerRecord, ListenerStatus,
	LISTENER_KEY_PREFIX,
};
pub use request::{FilterArgs, ListenerRequest, ListenerResponse};
