use crate::models::{Address, ChainId, ClaimBundle, ExecutionOutcome, SimulationResult};
use crate::web3::adapter::{AdapterError, ChainAdapter};
use alloy::primitives::U256;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy)]
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Wraps a chain adapter so price lookups are cached for `ttl` and never fail:
/// on a query error the last known value is served, or the fixed default when
/// nothing was ever fetched.
pub struct CachedChainAdapter<A> {
    inner: A,
    ttl: Duration,
    default_gas_price: u128,
    default_native_usd: f64,
    gas_price: Mutex<Option<Cached<u128>>>,
    native_usd: Mutex<Option<Cached<f64>>>,
}

impl<A: ChainAdapter> CachedChainAdapter<A> {
    pub fn new(inner: A, ttl: Duration, default_gas_price: u128, default_native_usd: f64) -> Self {
        Self {
            inner,
            ttl,
            default_gas_price,
            default_native_usd,
            gas_price: Mutex::new(None),
            native_usd: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn fresh<T: Copy>(&self, slot: &Mutex<Option<Cached<T>>>) -> (Option<T>, Option<T>) {
        match slot.lock() {
            Ok(guard) => match *guard {
                Some(cached) if cached.fetched_at.elapsed() < self.ttl => {
                    (Some(cached.value), Some(cached.value))
                }
                Some(cached) => (None, Some(cached.value)),
                None => (None, None),
            },
            Err(_) => (None, None),
        }
    }

    fn store<T>(slot: &Mutex<Option<Cached<T>>>, value: T) {
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(Cached {
                value,
                fetched_at: Instant::now(),
            });
        }
    }
}

#[async_trait]
impl<A: ChainAdapter> ChainAdapter for CachedChainAdapter<A> {
    fn chain(&self) -> &ChainId {
        self.inner.chain()
    }

    async fn gas_price(&self) -> Result<u128, AdapterError> {
        let (fresh, stale) = self.fresh(&self.gas_price);
        if let Some(value) = fresh {
            return Ok(value);
        }
        match self.inner.gas_price().await {
            Ok(value) if value > 0 => {
                Self::store(&self.gas_price, value);
                Ok(value)
            }
            Ok(_) => {
                warn!(
                    "{}: gas price query returned zero, using fallback",
                    self.inner.chain()
                );
                Ok(stale.unwrap_or(self.default_gas_price))
            }
            Err(e) => {
                warn!("{}: gas price query failed: {e}", self.inner.chain());
                Ok(stale.unwrap_or(self.default_gas_price))
            }
        }
    }

    async fn native_usd(&self) -> Result<f64, AdapterError> {
        let (fresh, stale) = self.fresh(&self.native_usd);
        if let Some(value) = fresh {
            return Ok(value);
        }
        match self.inner.native_usd().await {
            Ok(value) if value.is_finite() && value > 0.0 => {
                Self::store(&self.native_usd, value);
                Ok(value)
            }
            Ok(value) => {
                warn!(
                    "{}: native price query returned {value}, using fallback",
                    self.inner.chain()
                );
                Ok(stale.unwrap_or(self.default_native_usd))
            }
            Err(e) => {
                warn!("{}: native price query failed: {e}", self.inner.chain());
                Ok(stale.unwrap_or(self.default_native_usd))
            }
        }
    }

    async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, AdapterError> {
        self.inner.simulate(bundle).await
    }

    async fn send(&self, bundle: &ClaimBundle) -> Result<ExecutionOutcome, AdapterError> {
        debug!("{}: sending bundle {}", self.inner.chain(), bundle.id);
        self.inner.send(bundle).await
    }

    async fn get_balance(&self, address: &Address) -> Result<U256, AdapterError> {
        self.inner.get_balance(address).await
    }
}
