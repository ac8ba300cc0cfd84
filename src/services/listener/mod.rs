//! Listener pipeline.
//!
//! - [`ListenerManager`]: registry and lifecycle of all listeners
//! - [`BlockScanner`]: chunked scanning with retry and checkpointing
//! - [`EventBuffer`]: bounded queue with pause/resume signalling
//! - [`EventProcessor`]: callback invocation with failure isolation
//! - [`MetricsSink`]: per-listener counters fed without backpressure

mod buffer;
mod error;
mod manager;
mod processor;
mod scanner;
mod sink;

pub use buffer::{EventBuffer, FlowState};
pub use error::ListenerError;
pub use manager::{ListenerManager, ListenerNotification, ManagerSettings, RestoreReport};
pub use processor::{EventProcessor, ProcessorExit};
pub use scanner::{fetch_backoff, next_chunk, BlockScanner, ScanSettings, TickOutcome};
pub use sink::{MetricsSink, ProcessedEvent};
