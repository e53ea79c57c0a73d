use crate::bundler::build_bundles;
use crate::error::ClaimerError;
use crate::executor::retry::BackoffPolicy;
use crate::executor::Executor;
use crate::guard::{IdempotencyGuard, QuarantineTracker};
use crate::integrations::RewardSource;
use crate::ledger::Ledger;
use crate::metrics::MetricsContext;
use crate::policy::Policy;
use crate::profitability::{apply_estimate, estimate_bundle_gas_usd, is_profitable};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::models::{ChainId, ClaimBundle, RewardItem};
use shared::pricing::PriceOracle;
use shared::web3::ChainAdapter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Counters for one pass of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub wallets_discovered: usize,
    pub wallets_quarantined: usize,
    pub items_discovered: usize,
    pub items_eligible: usize,
    pub bundles_built: usize,
    pub unprofitable: usize,
    pub skipped: usize,
    pub no_adapter: usize,
    pub simulated: usize,
    pub claimed: usize,
    pub failed: usize,
    pub claimed_usd: f64,
}

#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport>;
}

pub struct ClaimPipeline {
    policy: Policy,
    sources: Vec<Arc<dyn RewardSource>>,
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
    price_oracle: Option<Arc<dyn PriceOracle>>,
    ledger: Arc<dyn Ledger>,
    guard: IdempotencyGuard,
    quarantine: Arc<QuarantineTracker>,
    executor: Executor,
    metrics: Option<Arc<MetricsContext>>,
    dry_run: bool,
}

impl ClaimPipeline {
    pub fn new(policy: Policy, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            guard: IdempotencyGuard::new(ledger.clone(), policy.cooldown()),
            quarantine: Arc::new(QuarantineTracker::from_policy(&policy)),
            executor: Executor::new(BackoffPolicy::from_policy(&policy)),
            policy,
            sources: Vec::new(),
            adapters: HashMap::new(),
            price_oracle: None,
            ledger,
            metrics: None,
            dry_run: false,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn RewardSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.chain().clone(), adapter);
        self
    }

    pub fn with_price_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.price_oracle = Some(oracle);
        self
    }

    pub fn with_quarantine(mut self, quarantine: Arc<QuarantineTracker>) -> Self {
        self.quarantine = quarantine;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsContext>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Simulate eligible bundles but never send or record them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn quarantine(&self) -> Arc<QuarantineTracker> {
        self.quarantine.clone()
    }

    fn adapter_for(&self, chain: &ChainId) -> Result<&Arc<dyn ChainAdapter>, ClaimerError> {
        self.adapters
            .get(chain)
            .ok_or_else(|| ClaimerError::MissingAdapter(chain.clone()))
    }

    fn count(&self, bundle: &ClaimBundle, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_bundle(bundle.chain.as_str(), &bundle.protocol, result);
        }
    }

    async fn discover(&self, report: &mut CycleReport) -> Vec<RewardItem> {
        let mut items = Vec::new();
        for source in &self.sources {
            let protocol = source.protocol();
            let wallets = match source.discover_wallets().await {
                Ok(wallets) => wallets,
                Err(e) => {
                    warn!("{protocol}: wallet discovery failed: {e:#}");
                    continue;
                }
            };
            report.wallets_discovered += wallets.len();

            let (eligible, quarantined): (Vec<_>, Vec<_>) = wallets
                .into_iter()
                .partition(|wallet| !self.quarantine.is_wallet_quarantined(wallet));
            for wallet in &quarantined {
                debug!("{protocol}: skipping quarantined wallet {wallet}");
            }
            report.wallets_quarantined += quarantined.len();
            if eligible.is_empty() {
                continue;
            }

            match source.get_pending_rewards(&eligible).await {
                Ok(found) => {
                    debug!("{protocol}: {} pending rewards", found.len());
                    items.extend(found);
                }
                Err(e) => warn!("{protocol}: reward lookup failed: {e:#}"),
            }
        }
        report.items_discovered = items.len();
        items
    }

    /// Drops invalid, duplicate, unpriced and dust items. Unpriced items are
    /// re-quoted once through the price oracle first.
    async fn eligible_items(&self, items: Vec<RewardItem>) -> Vec<RewardItem> {
        let mut seen = HashSet::new();
        let mut eligible = Vec::with_capacity(items.len());

        for mut item in items {
            if let Err(e) = item.validate() {
                warn!("Dropping invalid reward item: {e:#}");
                continue;
            }
            if !seen.insert(item.id.clone()) {
                debug!("Dropping duplicate reward item {}", item.id);
                continue;
            }
            if self.quarantine.is_wallet_quarantined(&item.wallet) {
                continue;
            }

            if item.amount_usd == 0.0 {
                if let Some(oracle) = &self.price_oracle {
                    item.amount_usd = oracle
                        .quote_to_usd(item.chain(), &item.token, &item.amount_wei)
                        .await;
                }
                if !(item.amount_usd.is_finite() && item.amount_usd > 0.0) {
                    debug!("Dropping unpriced reward item {} ({})", item.id, item.token);
                    continue;
                }
            }

            if item.amount_usd < self.policy.min_item_usd {
                debug!(
                    "Dropping reward item {} worth ${:.4} (minimum ${:.4})",
                    item.id, item.amount_usd, self.policy.min_item_usd
                );
                continue;
            }
            eligible.push(item);
        }
        eligible
    }

    async fn process_bundle(&self, mut bundle: ClaimBundle, report: &mut CycleReport) {
        let adapter = match self.adapter_for(&bundle.chain) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("{e}, skipping bundle {}", bundle.id);
                report.no_adapter += 1;
                self.count(&bundle, "no_adapter");
                return;
            }
        };

        let est = estimate_bundle_gas_usd(&bundle, Some(adapter.as_ref())).await;
        apply_estimate(&mut bundle, est);
        if !is_profitable(&bundle, &self.policy) {
            report.unprofitable += 1;
            self.count(&bundle, "unprofitable");
            return;
        }

        if self.guard.should_skip(&bundle).await {
            report.skipped += 1;
            self.count(&bundle, "skipped");
            return;
        }

        let key = format!("{}:{}", bundle.chain, &bundle.id[..12.min(bundle.id.len())]);

        if self.dry_run {
            let simulation = self.executor.simulate(&bundle, adapter.as_ref()).await;
            info!(
                "[{key}] dry run: {} items, gross ${:.2}, gas ${:.2}, simulation {}",
                bundle.len(),
                bundle.total_usd,
                bundle.est_gas_usd,
                simulation.reason.as_deref().unwrap_or("ok")
            );
            report.simulated += 1;
            self.count(&bundle, "simulated");
            return;
        }

        let outcome = self.executor.execute(&bundle, adapter.as_ref(), &key).await;

        if outcome.success {
            self.guard.remember_success(&bundle);
        }
        if let Err(e) = self.ledger.record(&bundle, &outcome).await {
            error!("[{key}] failed to record outcome of bundle {}: {e:#}", bundle.id);
        }

        if outcome.success {
            if let Err(e) = self.ledger.mark_claimed(&bundle.item_ids(), Utc::now()).await {
                error!("[{key}] failed to mark items of bundle {} claimed: {e:#}", bundle.id);
            }
            for wallet in bundle.wallets() {
                self.quarantine.record_success(&wallet);
            }
            report.claimed += 1;
            report.claimed_usd += outcome.claimed_usd;
            self.count(&bundle, "claimed");
            if let Some(metrics) = &self.metrics {
                metrics.record_claimed(bundle.chain.as_str(), &bundle.protocol, outcome.claimed_usd);
            }
        } else {
            for wallet in bundle.wallets() {
                self.quarantine.record_failure(&wallet);
            }
            report.failed += 1;
            self.count(&bundle, "failed");
        }
    }
}

#[async_trait]
impl CycleRunner for ClaimPipeline {
    async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let discovered = self.discover(&mut report).await;
        let items = self.eligible_items(discovered).await;
        report.items_eligible = items.len();

        let bundles = build_bundles(
            items,
            self.policy.min_bundle_size,
            self.policy.max_bundle_size,
        )?;
        report.bundles_built = bundles.len();

        for bundle in bundles {
            self.process_bundle(bundle, &mut report).await;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{ReadOnlyLedger, UnavailableLedger};
    use crate::ledger::MemoryLedger;
    use crate::testing::{reward, reward_for, FixedPriceOracle, StubAdapter, StubSource, WALLET};
    use shared::models::Address;
    use shared::web3::AdapterError;

    fn avalanche_items() -> Vec<RewardItem> {
        let mut items = vec![
            reward("1", "avalanche", "x", "0xdest"),
            reward("2", "avalanche", "x", "0xdest"),
            reward("3", "avalanche", "x", "0xdest"),
        ];
        items[0].amount_usd = 2.0;
        items[1].amount_usd = 1.5;
        items[2].amount_usd = 1.5;
        items
    }

    fn wallet() -> Address {
        Address::new(WALLET, ChainId::new("avalanche"))
    }

    #[tokio::test]
    async fn test_cycle_claims_profitable_bundle() {
        let ledger = Arc::new(MemoryLedger::new());
        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), ledger.clone())
            .with_source(Arc::new(StubSource::new("x", avalanche_items())))
            .with_adapter(adapter.clone());

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.bundles_built, 1);
        assert_eq!(report.claimed, 1);
        assert_eq!(report.claimed_usd, 5.0);
        assert_eq!(adapter.send_calls(), 1);

        let recent = ledger.get_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].outcome.success);
        assert!(ledger.has_succeeded(&recent[0].bundle_id).await.unwrap());
        assert_eq!(
            ledger
                .claimed_items(&["1".into(), "2".into(), "3".into()])
                .await
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn test_duplicate_bundle_is_skipped_next_cycle() {
        let ledger = Arc::new(MemoryLedger::new());
        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), ledger.clone())
            .with_source(Arc::new(StubSource::new("x", avalanche_items())))
            .with_adapter(adapter.clone());

        pipeline.run_cycle().await.unwrap();
        let second = pipeline.run_cycle().await.unwrap();

        assert_eq!(second.skipped, 1);
        assert_eq!(second.claimed, 0);
        assert_eq!(adapter.send_calls(), 1);
        let successes = ledger
            .get_recent(1)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.outcome.success)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_quarantine_wallet() {
        // five destinations -> five bundles for the same wallet, all failing
        let items: Vec<RewardItem> = (0..5)
            .flat_map(|d| {
                let dest = format!("0xdest{d}");
                let mut pair = vec![
                    reward(&format!("{d}a"), "avalanche", "x", &dest),
                    reward(&format!("{d}b"), "avalanche", "x", &dest),
                ];
                for item in &mut pair {
                    item.amount_usd = 1.5;
                }
                pair
            })
            .collect();
        let source = Arc::new(StubSource::new("x", items));
        let adapter = Arc::new(
            StubAdapter::new("avalanche")
                .always_failing(AdapterError::TerminalRejected("execution reverted".into())),
        );
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(source.clone())
            .with_adapter(adapter.clone());

        let first = pipeline.run_cycle().await.unwrap();
        assert_eq!(first.failed, 5);
        assert!(pipeline.quarantine().is_wallet_quarantined(&wallet()));

        let second = pipeline.run_cycle().await.unwrap();
        assert_eq!(second.wallets_quarantined, 1);
        assert_eq!(second.bundles_built, 0);
        assert_eq!(adapter.send_calls(), 5);
        // the quarantined wallet was never passed to reward lookup
        assert_eq!(source.requested().len(), 1);

        pipeline.quarantine().record_success(&wallet());
        pipeline.run_cycle().await.unwrap();
        assert_eq!(source.requested().len(), 2);
        assert_eq!(source.requested()[1], vec![wallet()]);
    }

    #[tokio::test]
    async fn test_unprofitable_bundle_is_not_executed() {
        let items = vec![
            reward("1", "avalanche", "x", "0xdest"),
            reward("2", "avalanche", "x", "0xdest"),
            reward("3", "avalanche", "x", "0xdest"),
        ];
        // $3 gross against $2.10 of gas at 500 gwei and $20
        let adapter = Arc::new(StubAdapter::new("avalanche").with_prices(500_000_000_000, 20.0));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::new("x", items)))
            .with_adapter(adapter.clone());

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.unprofitable, 1);
        assert_eq!(adapter.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_adapter_does_not_block_other_chains() {
        let mut items = avalanche_items();
        let mut eth = vec![
            reward("e1", "ethereum", "x", "0xdest"),
            reward("e2", "ethereum", "x", "0xdest"),
        ];
        for item in &mut eth {
            item.amount_usd = 5.0;
        }
        items.splice(0..0, eth);

        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::new("x", items)))
            .with_adapter(adapter.clone());

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.no_adapter, 1);
        assert_eq!(report.claimed, 1);
    }

    #[tokio::test]
    async fn test_unpriced_items_are_repriced_or_dropped() {
        let mut items = avalanche_items();
        for item in &mut items {
            item.amount_usd = 0.0;
        }

        let unpriced = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::new("x", items.clone())))
            .with_adapter(Arc::new(StubAdapter::new("avalanche")));
        let report = unpriced.run_cycle().await.unwrap();
        assert_eq!(report.items_discovered, 3);
        assert_eq!(report.items_eligible, 0);

        let priced = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::new("x", items)))
            .with_adapter(Arc::new(StubAdapter::new("avalanche")))
            .with_price_oracle(Arc::new(FixedPriceOracle(2.0)));
        let report = priced.run_cycle().await.unwrap();
        assert_eq!(report.items_eligible, 3);
        assert_eq!(report.claimed_usd, 6.0);
    }

    #[tokio::test]
    async fn test_invalid_dust_and_duplicate_items_are_dropped() {
        let mut items = avalanche_items();
        let mut invalid = reward("bad", "avalanche", "x", "0xdest");
        invalid.amount_wei = "12.5".to_string();
        let mut dust = reward("dust", "avalanche", "x", "0xdest");
        dust.amount_usd = 0.001;
        items.push(invalid);
        items.push(dust);
        items.push(items[0].clone());

        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::new("x", items)));
        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.items_discovered, 6);
        assert_eq!(report.items_eligible, 3);
    }

    #[tokio::test]
    async fn test_failing_source_contributes_nothing() {
        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::failing("y")))
            .with_source(Arc::new(StubSource::new("x", avalanche_items())))
            .with_adapter(adapter);

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.claimed, 1);
    }

    #[tokio::test]
    async fn test_lost_ledger_write_never_resends() {
        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(ReadOnlyLedger::default()))
            .with_source(Arc::new(StubSource::new("x", avalanche_items())))
            .with_adapter(adapter.clone());

        let first = pipeline.run_cycle().await.unwrap();
        assert_eq!(first.claimed, 1);
        let second = pipeline.run_cycle().await.unwrap();

        assert_eq!(second.skipped, 1);
        assert_eq!(second.claimed, 0);
        assert_eq!(adapter.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_ledger_outage_skips_everything() {
        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(UnavailableLedger))
            .with_source(Arc::new(StubSource::new("x", avalanche_items())))
            .with_adapter(adapter.clone());

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(adapter.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_only_simulates() {
        let ledger = Arc::new(MemoryLedger::new());
        let adapter = Arc::new(StubAdapter::new("avalanche"));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), ledger.clone())
            .with_source(Arc::new(StubSource::new("x", avalanche_items())))
            .with_adapter(adapter.clone())
            .dry_run(true);

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.simulated, 1);
        assert_eq!(adapter.send_calls(), 0);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_wallets_fail_independently() {
        let mut items = Vec::new();
        for wallet in ["0xa", "0xb"] {
            for n in 0..2 {
                let mut item = reward_for(wallet, &format!("{wallet}-{n}"), "avalanche", "x", wallet);
                item.amount_usd = 1.5;
                items.push(item);
            }
        }
        let adapter = Arc::new(StubAdapter::new("avalanche").with_send_script(vec![Err(
            AdapterError::TerminalRejected("reverted".into()),
        )]));
        let pipeline = ClaimPipeline::new(Policy::for_tests(), Arc::new(MemoryLedger::new()))
            .with_source(Arc::new(StubSource::new("x", items)))
            .with_adapter(adapter);

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.claimed, 1);
        let failed_wallet = Address::new("0xa", ChainId::new("avalanche"));
        assert_eq!(
            pipeline.quarantine().entry(&failed_wallet).unwrap().failure_count,
            1
        );
    }
}
