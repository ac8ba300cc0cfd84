//! Core services of the listener.
//!
//! - `chain`: chain reader interface and the EVM JSON-RPC implementation
//! - `checkpoint`: durable listener records and checkpoints
//! - `callback`: downstream delivery of matched events
//! - `listener`: scanner, buffer, processor, sink and the listener manager
//! - `queue`: file spool of listener creation requests

pub mod callback;
pub mod chain;
pub mod checkpoint;
pub mod listener;
pub mod queue;
