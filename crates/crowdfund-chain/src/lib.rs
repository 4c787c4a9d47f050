//! Chain gateway and the reconciler that replays contract events into the
//! campaign store.

pub mod contract;
pub mod gateway;
pub mod reconciler;
pub mod sync;

pub use contract::Web3Gateway;
pub use gateway::{ChainConfig, ChainGateway, ChainReader, EventStream, OnChainCampaign};
pub use reconciler::{Reconciler, ReconcilerHandle};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// Missing or malformed connection parameters. Retrying cannot help.
    #[error("chain configuration error: {0}")]
    Config(String),

    #[error("chain transport error: {0}")]
    Transport(String),

    /// A log or call result did not match the contract ABI.
    #[error("chain decode error: {0}")]
    Decode(String),
}

impl ChainError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
