use crate::models::ClaimBundle;
use crate::web3::adapter::AdapterError;
use alloy::network::TransactionBuilder;
use alloy::primitives::{keccak256, Address as EvmAddress, B256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use std::collections::HashMap;
use std::str::FromStr;

sol! {
    interface IRewardDistributor {
        function claim(bytes32[] calldata rewardIds, address recipient) external;
    }
}

/// Turns a bundle into the protocol-specific claim call. How a reward is
/// claimed on-chain is decided here, outside the pipeline.
pub trait ClaimCallBuilder: Send + Sync {
    fn build(&self, bundle: &ClaimBundle) -> Result<TransactionRequest, AdapterError>;
}

/// Claims through a per-protocol distributor contract exposing
/// `claim(bytes32[] rewardIds, address recipient)`.
#[derive(Debug, Clone, Default)]
pub struct DistributorClaimBuilder {
    distributors: HashMap<String, EvmAddress>,
}

impl DistributorClaimBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distributor(mut self, protocol: &str, contract: EvmAddress) -> Self {
        self.distributors.insert(protocol.to_string(), contract);
        self
    }

    pub fn reward_id(item_id: &str) -> B256 {
        keccak256(item_id.as_bytes())
    }
}

impl ClaimCallBuilder for DistributorClaimBuilder {
    fn build(&self, bundle: &ClaimBundle) -> Result<TransactionRequest, AdapterError> {
        let contract = self.distributors.get(&bundle.protocol).ok_or_else(|| {
            AdapterError::TerminalRejected(format!(
                "no distributor configured for protocol {}",
                bundle.protocol
            ))
        })?;
        let recipient = EvmAddress::from_str(&bundle.claim_to.value).map_err(|e| {
            AdapterError::TerminalRejected(format!(
                "invalid claim destination {}: {e}",
                bundle.claim_to.value
            ))
        })?;

        let call = IRewardDistributor::claimCall {
            rewardIds: bundle
                .items
                .iter()
                .map(|item| Self::reward_id(&item.id))
                .collect(),
            recipient,
        };

        Ok(TransactionRequest::default()
            .with_to(*contract)
            .with_input(call.abi_encode()))
    }
}
