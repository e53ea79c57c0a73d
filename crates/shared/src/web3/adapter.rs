use crate::models::{Address, ChainId, ClaimBundle, ErrorKind, ExecutionOutcome, SimulationResult};
use alloy::primitives::U256;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Network or timeout-like failure; the same request may be retried.
    #[error("transient adapter failure: {0}")]
    Transient(String),
    /// Confirmed revert or insufficient funds; retrying the same bundle is pointless.
    #[error("rejected: {0}")]
    TerminalRejected(String),
    #[error("unclassified adapter failure: {0}")]
    Unknown(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Transient(_) => ErrorKind::Transient,
            AdapterError::TerminalRejected(_) => ErrorKind::TerminalRejected,
            AdapterError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AdapterError::Transient(msg)
            | AdapterError::TerminalRejected(msg)
            | AdapterError::Unknown(msg) => msg,
        }
    }
}

impl From<AdapterError> for ExecutionOutcome {
    fn from(err: AdapterError) -> Self {
        ExecutionOutcome::failed(err.kind(), err.to_string())
    }
}

/// Per-chain transaction plumbing consumed by the claim pipeline.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> &ChainId;

    /// Gas price in the native asset's smallest unit.
    async fn gas_price(&self) -> Result<u128, AdapterError>;

    /// USD price of one whole native unit.
    async fn native_usd(&self) -> Result<f64, AdapterError>;

    /// Checks preconditions for a claim without touching chain state.
    async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, AdapterError>;

    async fn send(&self, bundle: &ClaimBundle) -> Result<ExecutionOutcome, AdapterError>;

    async fn get_balance(&self, address: &Address) -> Result<U256, AdapterError>;
}
