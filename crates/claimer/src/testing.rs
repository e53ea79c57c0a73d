//! Stub collaborators shared by unit tests.

use crate::integrations::RewardSource;
use alloy::primitives::U256;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::models::{Address, ChainId, ClaimBundle, ExecutionOutcome, RewardItem, SimulationResult};
use shared::pricing::PriceOracle;
use shared::web3::{AdapterError, ChainAdapter};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub(crate) const WALLET: &str = "0xwallet";

/// A $1.00 item held by [`WALLET`].
pub(crate) fn reward(id: &str, chain: &str, protocol: &str, claim_to: &str) -> RewardItem {
    reward_for(WALLET, id, chain, protocol, claim_to)
}

pub(crate) fn reward_for(
    wallet: &str,
    id: &str,
    chain: &str,
    protocol: &str,
    claim_to: &str,
) -> RewardItem {
    let chain = ChainId::new(chain);
    RewardItem {
        id: id.to_string(),
        wallet: Address::new(wallet, chain.clone()),
        protocol: protocol.to_string(),
        token: Address::new("0xtoken", chain.clone()),
        amount_wei: "1000000000000000000".to_string(),
        amount_usd: 1.0,
        claim_to: Address::new(claim_to, chain),
        discovered_at: Utc::now(),
        last_claim_at: None,
    }
}

pub(crate) struct StubAdapter {
    chain: ChainId,
    gas_price: Result<u128, AdapterError>,
    native_usd: Result<f64, AdapterError>,
    simulation: Result<SimulationResult, AdapterError>,
    send_script: Mutex<VecDeque<Result<ExecutionOutcome, AdapterError>>>,
    send_fallback: Option<Result<ExecutionOutcome, AdapterError>>,
    send_calls: AtomicU32,
}

impl StubAdapter {
    /// 25 gwei gas, $20 native asset, simulations pass, sends succeed.
    pub(crate) fn new(chain: &str) -> Self {
        Self {
            chain: ChainId::new(chain),
            gas_price: Ok(25_000_000_000),
            native_usd: Ok(20.0),
            simulation: Ok(SimulationResult::ok()),
            send_script: Mutex::new(VecDeque::new()),
            send_fallback: None,
            send_calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn with_prices(mut self, gas_price: u128, native_usd: f64) -> Self {
        self.gas_price = Ok(gas_price);
        self.native_usd = Ok(native_usd);
        self
    }

    pub(crate) fn with_price_errors(mut self, err: AdapterError) -> Self {
        self.gas_price = Err(err.clone());
        self.native_usd = Err(err);
        self
    }

    pub(crate) fn with_simulation(mut self, result: SimulationResult) -> Self {
        self.simulation = Ok(result);
        self
    }

    pub(crate) fn with_simulation_error(mut self, err: AdapterError) -> Self {
        self.simulation = Err(err);
        self
    }

    /// Responses served in order; once exhausted, sends fall back to success.
    pub(crate) fn with_send_script(
        self,
        script: Vec<Result<ExecutionOutcome, AdapterError>>,
    ) -> Self {
        if let Ok(mut queue) = self.send_script.lock() {
            queue.extend(script);
        }
        self
    }

    pub(crate) fn always_failing(mut self, err: AdapterError) -> Self {
        self.send_fallback = Some(Err(err));
        self
    }

    pub(crate) fn send_calls(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainAdapter for StubAdapter {
    fn chain(&self) -> &ChainId {
        &self.chain
    }

    async fn gas_price(&self) -> Result<u128, AdapterError> {
        self.gas_price.clone()
    }

    async fn native_usd(&self) -> Result<f64, AdapterError> {
        self.native_usd.clone()
    }

    async fn simulate(&self, _bundle: &ClaimBundle) -> Result<SimulationResult, AdapterError> {
        self.simulation.clone()
    }

    async fn send(&self, bundle: &ClaimBundle) -> Result<ExecutionOutcome, AdapterError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.send_script.lock().unwrap().pop_front() {
            return scripted;
        }
        match &self.send_fallback {
            Some(fallback) => fallback.clone(),
            None => Ok(ExecutionOutcome::succeeded(
                format!("0x{}", &bundle.id[..16]),
                Some(100_000),
                Some(0.05),
                bundle.total_usd,
            )),
        }
    }

    async fn get_balance(&self, _address: &Address) -> Result<U256, AdapterError> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }
}

pub(crate) struct StubSource {
    protocol: String,
    wallets: Vec<Address>,
    items: Vec<RewardItem>,
    fail: bool,
    requested: Mutex<Vec<Vec<Address>>>,
}

impl StubSource {
    /// Serves `items`, advertising every distinct wallet among them.
    pub(crate) fn new(protocol: &str, items: Vec<RewardItem>) -> Self {
        let mut wallets: Vec<Address> = Vec::new();
        for item in &items {
            if !wallets.contains(&item.wallet) {
                wallets.push(item.wallet.clone());
            }
        }
        Self {
            protocol: protocol.to_string(),
            wallets,
            items,
            fail: false,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(protocol: &str) -> Self {
        let mut source = Self::new(protocol, Vec::new());
        source.fail = true;
        source
    }

    /// Wallet lists passed to `get_pending_rewards`, one entry per call.
    pub(crate) fn requested(&self) -> Vec<Vec<Address>> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewardSource for StubSource {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn discover_wallets(&self) -> Result<Vec<Address>> {
        if self.fail {
            bail!("{} discovery is down", self.protocol);
        }
        Ok(self.wallets.clone())
    }

    async fn get_pending_rewards(&self, wallets: &[Address]) -> Result<Vec<RewardItem>> {
        self.requested.lock().unwrap().push(wallets.to_vec());
        Ok(self
            .items
            .iter()
            .filter(|item| wallets.contains(&item.wallet))
            .cloned()
            .collect())
    }
}

pub(crate) struct FixedPriceOracle(pub(crate) f64);

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn quote_to_usd(&self, _chain: &ChainId, _token: &Address, _amount_wei: &str) -> f64 {
        self.0
    }
}
