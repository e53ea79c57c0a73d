pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{Address, ChainId, ClaimBundle, ExecutionOutcome};

pub use memory::MemoryLedger;

/// One executed bundle and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub bundle_id: String,
    pub chain: ChainId,
    pub protocol: String,
    pub claim_to: Address,
    pub wallets: Vec<Address>,
    pub item_ids: Vec<String>,
    pub total_usd: f64,
    pub est_gas_usd: f64,
    pub outcome: ExecutionOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn new(bundle: &ClaimBundle, outcome: &ExecutionOutcome, recorded_at: DateTime<Utc>) -> Self {
        Self {
            bundle_id: bundle.id.clone(),
            chain: bundle.chain.clone(),
            protocol: bundle.protocol.clone(),
            claim_to: bundle.claim_to.clone(),
            wallets: bundle.wallets(),
            item_ids: bundle.item_ids(),
            total_usd: bundle.total_usd,
            est_gas_usd: bundle.est_gas_usd,
            outcome: outcome.clone(),
            recorded_at,
        }
    }
}

/// Durable history of claim attempts.
///
/// A successful `record` also marks the bundle as done and stamps every member
/// wallet's last-claim time for the bundle's protocol, atomically.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record(&self, bundle: &ClaimBundle, outcome: &ExecutionOutcome) -> Result<()>;

    /// Marks every id as claimed at `at`, or none of them.
    async fn mark_claimed(&self, item_ids: &[String], at: DateTime<Utc>) -> Result<()>;

    /// Records written within the last `hours_back` hours, newest first.
    async fn get_recent(&self, hours_back: u32) -> Result<Vec<LedgerRecord>>;

    /// Latest successful claim for `wallet` across all protocols.
    async fn last_claim_time(&self, wallet: &Address) -> Result<Option<DateTime<Utc>>>;

    async fn last_claim_time_for(
        &self,
        wallet: &Address,
        protocol: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn has_succeeded(&self, bundle_id: &str) -> Result<bool>;

    /// The subset of `item_ids` already marked claimed.
    async fn claimed_items(&self, item_ids: &[String]) -> Result<Vec<String>>;
}
