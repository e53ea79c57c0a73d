use alloy::primitives::U256;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercased, trimmed chain name. Deserialization normalises the same way as
/// [`ChainId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainId {
    fn from(name: &str) -> Self {
        ChainId::new(name)
    }
}

impl From<String> for ChainId {
    fn from(name: String) -> Self {
        ChainId::new(&name)
    }
}

impl From<ChainId> for String {
    fn from(chain: ChainId) -> Self {
        chain.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain-specific account identifier. Two addresses are equal only when both
/// the value and the chain match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub value: String,
    pub chain: ChainId,
}

impl Address {
    pub fn new(value: &str, chain: ChainId) -> Self {
        Self {
            value: value.to_string(),
            chain,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardItem {
    pub id: String,
    pub wallet: Address,
    pub protocol: String,
    pub token: Address,
    /// Integer amount in the token's smallest unit, kept as a decimal string.
    pub amount_wei: String,
    pub amount_usd: f64,
    pub claim_to: Address,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_claim_at: Option<DateTime<Utc>>,
}

impl RewardItem {
    pub fn chain(&self) -> &ChainId {
        &self.wallet.chain
    }

    pub fn amount(&self) -> Result<U256> {
        let raw = self.amount_wei.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            bail!("amount_wei '{}' is not a decimal integer", self.amount_wei);
        }
        U256::from_str_radix(raw, 10)
            .map_err(|e| anyhow!("amount_wei '{}' out of range: {}", self.amount_wei, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            bail!("reward item has an empty id");
        }
        if !self.amount_usd.is_finite() || self.amount_usd < 0.0 {
            bail!(
                "reward item {} has invalid amount_usd {}",
                self.id,
                self.amount_usd
            );
        }
        self.amount()?;
        Ok(())
    }
}
