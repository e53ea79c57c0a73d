use crate::ledger::{Ledger, LedgerRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::models::{Address, ClaimBundle, ExecutionOutcome};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    records: Vec<LedgerRecord>,
    succeeded: HashSet<String>,
    last_claims: HashMap<(Address, String), DateTime<Utc>>,
    claimed: HashMap<String, DateTime<Utc>>,
}

/// Process-local ledger for dry runs and tests. History is lost on exit.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record(&self, bundle: &ClaimBundle, outcome: &ExecutionOutcome) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.records.push(LedgerRecord::new(bundle, outcome, now));
        if outcome.success {
            state.succeeded.insert(bundle.id.clone());
            for wallet in bundle.wallets() {
                state
                    .last_claims
                    .insert((wallet, bundle.protocol.clone()), now);
            }
        }
        Ok(())
    }

    async fn mark_claimed(&self, item_ids: &[String], at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        for id in item_ids {
            state.claimed.insert(id.clone(), at);
        }
        Ok(())
    }

    async fn get_recent(&self, hours_back: u32) -> Result<Vec<LedgerRecord>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours_back));
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.recorded_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn last_claim_time(&self, wallet: &Address) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .last_claims
            .iter()
            .filter(|((w, _), _)| w == wallet)
            .map(|(_, at)| *at)
            .max())
    }

    async fn last_claim_time_for(
        &self,
        wallet: &Address,
        protocol: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .last_claims
            .get(&(wallet.clone(), protocol.to_string()))
            .copied())
    }

    async fn has_succeeded(&self, bundle_id: &str) -> Result<bool> {
        Ok(self.state.read().await.succeeded.contains(bundle_id))
    }

    async fn claimed_items(&self, item_ids: &[String]) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(item_ids
            .iter()
            .filter(|id| state.claimed.contains_key(*id))
            .cloned()
            .collect())
    }
}

/// Ledger whose every call fails, for exercising fail-closed paths.
#[cfg(test)]
pub(crate) struct UnavailableLedger;

#[cfg(test)]
#[async_trait]
impl Ledger for UnavailableLedger {
    async fn record(&self, _: &ClaimBundle, _: &ExecutionOutcome) -> Result<()> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
    async fn mark_claimed(&self, _: &[String], _: DateTime<Utc>) -> Result<()> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
    async fn get_recent(&self, _: u32) -> Result<Vec<LedgerRecord>> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
    async fn last_claim_time(&self, _: &Address) -> Result<Option<DateTime<Utc>>> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
    async fn last_claim_time_for(&self, _: &Address, _: &str) -> Result<Option<DateTime<Utc>>> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
    async fn has_succeeded(&self, _: &str) -> Result<bool> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
    async fn claimed_items(&self, _: &[String]) -> Result<Vec<String>> {
        Err(anyhow::anyhow!("ledger unavailable"))
    }
}

/// Ledger that answers reads from memory but rejects every write.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ReadOnlyLedger(pub(crate) MemoryLedger);

#[cfg(test)]
#[async_trait]
impl Ledger for ReadOnlyLedger {
    async fn record(&self, _: &ClaimBundle, _: &ExecutionOutcome) -> Result<()> {
        Err(anyhow::anyhow!("ledger is read-only"))
    }
    async fn mark_claimed(&self, _: &[String], _: DateTime<Utc>) -> Result<()> {
        Err(anyhow::anyhow!("ledger is read-only"))
    }
    async fn get_recent(&self, hours_back: u32) -> Result<Vec<LedgerRecord>> {
        self.0.get_recent(hours_back).await
    }
    async fn last_claim_time(&self, wallet: &Address) -> Result<Option<DateTime<Utc>>> {
        self.0.last_claim_time(wallet).await
    }
    async fn last_claim_time_for(
        &self,
        wallet: &Address,
        protocol: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.0.last_claim_time_for(wallet, protocol).await
    }
    async fn has_succeeded(&self, bundle_id: &str) -> Result<bool> {
        self.0.has_succeeded(bundle_id).await
    }
    async fn claimed_items(&self, item_ids: &[String]) -> Result<Vec<String>> {
        self.0.claimed_items(item_ids).await
    }
}
