pub mod adapter;
pub mod cache;
pub mod claim_call;
pub mod evm;
pub mod units;
pub mod wallet;

pub use adapter::{AdapterError, ChainAdapter};
pub use cache::CachedChainAdapter;
pub use claim_call::{ClaimCallBuilder, DistributorClaimBuilder};
pub use evm::EvmChainAdapter;
pub use wallet::Wallet;
