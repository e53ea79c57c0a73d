use crate::models::{
    Address, ChainId, ClaimBundle, ErrorKind, ExecutionOutcome, SimulationResult,
};
use crate::pricing::PriceOracle;
use crate::web3::adapter::{AdapterError, ChainAdapter};
use crate::web3::claim_call::ClaimCallBuilder;
use crate::web3::units::{gas_cost_wei, one_unit, to_decimal};
use crate::web3::wallet::Wallet;
use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address as EvmAddress, U256};
use alloy::providers::{PendingTransactionError, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// JSON-RPC codes providers use for rate limiting and internal hiccups.
const RETRYABLE_RPC_CODES: [i64; 3] = [-32005, -32603, 429];
// Worst-case gas headroom applied during simulation, in percent.
const GAS_HEADROOM_PERCENT: u64 = 120;
const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct EvmChainAdapter {
    chain: ChainId,
    wallet: Wallet,
    claim_builder: Arc<dyn ClaimCallBuilder>,
    price_oracle: Arc<dyn PriceOracle>,
    native_token: Address,
    native_decimals: u8,
    receipt_timeout: Duration,
}

impl EvmChainAdapter {
    pub fn new(
        chain: ChainId,
        wallet: Wallet,
        claim_builder: Arc<dyn ClaimCallBuilder>,
        price_oracle: Arc<dyn PriceOracle>,
        native_token: Address,
        native_decimals: u8,
    ) -> Self {
        Self {
            chain,
            wallet,
            claim_builder,
            price_oracle,
            native_token,
            native_decimals,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    fn claim_request(&self, bundle: &ClaimBundle) -> Result<TransactionRequest, AdapterError> {
        if bundle.chain != self.chain {
            return Err(AdapterError::TerminalRejected(format!(
                "bundle {} targets {} but adapter serves {}",
                bundle.id, bundle.chain, self.chain
            )));
        }
        let request = self.claim_builder.build(bundle)?;
        Ok(request.with_from(self.wallet.address()))
    }

    fn gas_usd(&self, gas_used: u64, gas_price: u128, native_usd: f64) -> f64 {
        to_decimal(gas_cost_wei(gas_used, gas_price), self.native_decimals) * native_usd
    }
}

pub fn classify_transport_error(err: &TransportError) -> AdapterError {
    if let Some(payload) = err.as_error_resp() {
        if RETRYABLE_RPC_CODES.contains(&payload.code) {
            return AdapterError::Transient(err.to_string());
        }
        return AdapterError::TerminalRejected(err.to_string());
    }
    if err.is_transport_error() {
        return AdapterError::Transient(err.to_string());
    }
    AdapterError::Unknown(err.to_string())
}

fn classify_pending_error(err: PendingTransactionError) -> AdapterError {
    match err {
        PendingTransactionError::TransportError(e) => match classify_transport_error(&e) {
            // The transaction was already broadcast; resubmitting could double-claim.
            AdapterError::Transient(msg) => AdapterError::Unknown(msg),
            other => other,
        },
        other => AdapterError::Unknown(other.to_string()),
    }
}

#[async_trait]
impl ChainAdapter for EvmChainAdapter {
    fn chain(&self) -> &ChainId {
        &self.chain
    }

    async fn gas_price(&self) -> Result<u128, AdapterError> {
        self.wallet
            .provider
            .get_gas_price()
            .await
            .map_err(|e| classify_transport_error(&e))
    }

    async fn native_usd(&self) -> Result<f64, AdapterError> {
        let one = one_unit(self.native_decimals).to_string();
        let price = self
            .price_oracle
            .quote_to_usd(&self.chain, &self.native_token, &one)
            .await;
        if price > 0.0 && price.is_finite() {
            Ok(price)
        } else {
            Err(AdapterError::Transient(format!(
                "native asset on {} is unpriced",
                self.chain
            )))
        }
    }

    async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, AdapterError> {
        let request = match self.claim_request(bundle) {
            Ok(request) => request,
            Err(e) => return Ok(SimulationResult::rejected(e.to_string())),
        };

        let gas = match self.wallet.provider.estimate_gas(request).await {
            Ok(gas) => gas,
            Err(e) => {
                return match classify_transport_error(&e) {
                    AdapterError::TerminalRejected(msg) => {
                        Ok(SimulationResult::rejected(format!("claim would revert: {msg}")))
                    }
                    other => Err(other),
                }
            }
        };
        let gas_price = self.gas_price().await?;
        let worst_case = gas_cost_wei(gas, gas_price) * U256::from(GAS_HEADROOM_PERCENT)
            / U256::from(100u64);

        let balance = self
            .wallet
            .provider
            .get_balance(self.wallet.address())
            .await
            .map_err(|e| classify_transport_error(&e))?;
        if balance < worst_case {
            return Ok(SimulationResult::rejected(format!(
                "insufficient funds for gas: balance {balance} < required {worst_case}"
            )));
        }

        debug!(
            "{}: bundle {} simulated ok, estimated gas {gas}",
            self.chain, bundle.id
        );
        Ok(SimulationResult::ok())
    }

    async fn send(&self, bundle: &ClaimBundle) -> Result<ExecutionOutcome, AdapterError> {
        let request = self.claim_request(bundle)?;
        let pending = self
            .wallet
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let tx_hash = *pending.tx_hash();
        info!("{}: submitted claim {tx_hash} for bundle {}", self.chain, bundle.id);

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(classify_pending_error)?;

        if !receipt.status() {
            return Ok(ExecutionOutcome::failed(
                ErrorKind::TerminalRejected,
                format!("transaction {tx_hash} reverted"),
            ));
        }

        let gas_used = receipt.gas_used();
        let gas_usd = match self.native_usd().await {
            Ok(native_usd) => Some(self.gas_usd(gas_used, receipt.effective_gas_price(), native_usd)),
            Err(e) => {
                warn!("{}: could not price gas for {tx_hash}: {e}", self.chain);
                None
            }
        };

        Ok(ExecutionOutcome::succeeded(
            tx_hash.to_string(),
            Some(gas_used),
            gas_usd,
            bundle.total_usd,
        ))
    }

    async fn get_balance(&self, address: &Address) -> Result<U256, AdapterError> {
        let account = EvmAddress::from_str(&address.value).map_err(|e| {
            AdapterError::TerminalRejected(format!("invalid address {}: {e}", address.value))
        })?;
        self.wallet
            .provider
            .get_balance(account)
            .await
            .map_err(|e| classify_transport_error(&e))
    }
}
