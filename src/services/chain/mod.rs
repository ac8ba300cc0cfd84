//! Read access to chains.
//!
//! [`ChainReader`] is the only thing the listener pipeline needs from a chain:
//! the current height and the logs matching a filter over a block range.
//! [`EvmChainReader`] implements it over JSON-RPC.

mod error;
mod evm;
mod transport;

pub use error::{ChainReaderError, TransportError};
pub use evm::EvmChainReader;
pub use transport::{RpcRetryStrategy, RpcTransport, ROTATE_ON_ERROR_CODES};

use async_trait::async_trait;

use crate::models::{ListenerFilter, LogEvent};

#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Latest block number known to the provider
	async fn current_block_height(&self, chain_id: u64) -> Result<u64, ChainReaderError>;

	/// Logs matching `filter` in `[from_block, to_block]`, in chain order
	async fn get_logs(
		&self,
		chain_id: u64,
		filter: &ListenerFilter,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<LogEvent>, ChainReaderError>;
}
