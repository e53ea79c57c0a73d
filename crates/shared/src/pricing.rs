use crate::models::{Address, ChainId};
use async_trait::async_trait;

/// USD valuation of token amounts. Implementations return `0.0` when no price
/// source is available; callers must treat that as unpriced, never as free.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn quote_to_usd(&self, chain: &ChainId, token: &Address, amount_wei: &str) -> f64;
}

/// Oracle for deployments without a price service. Everything is unpriced.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriceOracle;

#[async_trait]
impl PriceOracle for NoPriceOracle {
    async fn quote_to_usd(&self, _chain: &ChainId, _token: &Address, _amount_wei: &str) -> f64 {
        0.0
    }
}
