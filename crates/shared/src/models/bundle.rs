use crate::models::reward::{Address, ChainId, RewardItem};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Items grouped into a single claim transaction. All members share the same
/// `(chain, protocol, claim_to)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimBundle {
    pub id: String,
    pub chain: ChainId,
    pub protocol: String,
    pub claim_to: Address,
    pub items: Vec<RewardItem>,
    pub total_usd: f64,
    pub est_gas_usd: f64,
    pub net_usd: f64,
}

impl ClaimBundle {
    pub fn new(items: Vec<RewardItem>) -> Result<Self> {
        let Some(first) = items.first() else {
            bail!("cannot build a claim bundle without items");
        };
        let chain = first.chain().clone();
        let protocol = first.protocol.clone();
        let claim_to = first.claim_to.clone();

        if let Some(stray) = items
            .iter()
            .find(|item| item.chain() != &chain || item.protocol != protocol || item.claim_to != claim_to)
        {
            bail!(
                "item {} does not match bundle key ({}, {}, {})",
                stray.id,
                chain,
                protocol,
                claim_to
            );
        }

        let id = bundle_id(&chain, &protocol, &claim_to, items.iter().map(|i| i.id.as_str()));
        let total_usd = items.iter().map(|i| i.amount_usd).sum();

        Ok(Self {
            id,
            chain,
            protocol,
            claim_to,
            items,
            total_usd,
            est_gas_usd: 0.0,
            net_usd: total_usd,
        })
    }

    pub fn key(&self) -> BundleKey {
        BundleKey {
            chain: self.chain.clone(),
            protocol: self.protocol.clone(),
            claim_to: self.claim_to.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    /// Distinct member wallets in first-seen order.
    pub fn wallets(&self) -> Vec<Address> {
        let mut wallets: Vec<Address> = Vec::new();
        for item in &self.items {
            if !wallets.contains(&item.wallet) {
                wallets.push(item.wallet.clone());
            }
        }
        wallets
    }

    pub fn set_gas_estimate(&mut self, est_gas_usd: f64) {
        self.est_gas_usd = est_gas_usd;
        self.net_usd = self.total_usd - est_gas_usd;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleKey {
    pub chain: ChainId,
    pub protocol: String,
    pub claim_to: Address,
}

impl BundleKey {
    pub fn of(item: &RewardItem) -> Self {
        Self {
            chain: item.chain().clone(),
            protocol: item.protocol.clone(),
            claim_to: item.claim_to.clone(),
        }
    }
}

/// sha256 over the grouping key and the sorted member ids, NUL separated.
pub fn bundle_id<'a>(
    chain: &ChainId,
    protocol: &str,
    claim_to: &Address,
    item_ids: impl Iterator<Item = &'a str>,
) -> String {
    let mut ids: Vec<&str> = item_ids.collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(chain.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(protocol.as_bytes());
    hasher.update([0u8]);
    hasher.update(claim_to.value.as_bytes());
    for id in ids {
        hasher.update([0u8]);
        hasher.update(id.as_bytes());
    }
    hex::encode(hasher.finalize())
}
