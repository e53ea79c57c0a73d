use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use log::{error, info, warn};
use shared::models::{Address, ChainId};
use shared::pricing::{NoPriceOracle, PriceOracle};
use shared::web3::{
    CachedChainAdapter, ChainAdapter, DistributorClaimBuilder, EvmChainAdapter, Wallet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{start_server, AppState},
    config::{ChainConfig, ClaimerConfig},
    error::ClaimerError,
    guard::QuarantineTracker,
    integrations::{HttpPriceOracle, HttpRewardSource},
    ledger::{Ledger, MemoryLedger},
    metrics::MetricsContext,
    pipeline::ClaimPipeline,
    policy::Policy,
    profitability::GasProfile,
    scheduler::Scheduler,
    store::{core::RedisStore, domains::RedisLedger},
    utils::loop_heartbeats::LoopHeartbeats,
};

#[derive(Parser)]
pub struct Cli {
    /// Path to the claimer TOML config
    #[arg(short = 'c', long, default_value = "claimer.toml")]
    pub config: PathBuf,

    /// Redis URL
    #[arg(long, default_value = "redis://localhost:6380")]
    pub redis_url: String,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Host for the health and metrics server
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the health and metrics server
    #[arg(short = 'p', long, default_value = "9880")]
    pub port: u16,

    /// Run a single cycle and exit
    #[arg(long, default_value = "false")]
    pub once: bool,

    /// Simulate bundles without sending transactions.
    /// Outcomes are kept in memory only.
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

impl Cli {
    pub async fn run(self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let config = ClaimerConfig::load(&self.config)?;
        let policy = config.policy.clone();
        info!(
            "Loaded {} chains and {} reward sources from {}",
            config.chains.len(),
            config.sources.len(),
            self.config.display()
        );

        let metrics = Arc::new(MetricsContext::new()?);

        let ledger: Arc<dyn Ledger> = if self.dry_run {
            info!("Dry run: outcomes are kept in memory and nothing is sent");
            Arc::new(MemoryLedger::new())
        } else {
            let store = Arc::new(RedisStore::new(&self.redis_url)?);
            store.ping().await?;
            Arc::new(RedisLedger::new(store).with_cooldown(policy.cooldown()))
        };

        let price_oracle: Arc<dyn PriceOracle> = match &config.pricing {
            Some(pricing) => Arc::new(HttpPriceOracle::new(&pricing.url)?),
            None => {
                warn!("No [pricing] service configured, unpriced rewards will be dropped");
                Arc::new(NoPriceOracle)
            }
        };

        let quarantine = Arc::new(QuarantineTracker::from_policy(&policy));
        let mut pipeline = ClaimPipeline::new(policy.clone(), ledger.clone())
            .with_price_oracle(price_oracle.clone())
            .with_quarantine(quarantine.clone())
            .with_metrics(metrics.clone())
            .dry_run(self.dry_run);

        for chain in &config.chains {
            let adapter = build_adapter(chain, &policy, price_oracle.clone())?;
            info!("Chain adapter ready for {}", chain.name);
            pipeline = pipeline.with_adapter(adapter);
        }
        for source in &config.sources {
            let served = config
                .chains
                .iter()
                .any(|chain| chain.distributors.contains_key(&source.protocol));
            if !served {
                warn!(
                    "No chain has a distributor for {}, its claims will be rejected",
                    source.protocol
                );
            }
            pipeline =
                pipeline.with_source(Arc::new(HttpRewardSource::new(&source.protocol, &source.url)?));
        }

        let heartbeats = Arc::new(LoopHeartbeats::new(policy.tick_interval()));
        let scheduler = Scheduler::new(
            policy.tick_interval(),
            policy.tick_jitter(),
            cancellation_token.clone(),
        )
        .with_heartbeats(heartbeats.clone())
        .with_metrics(metrics.clone());

        if self.once {
            let Some(report) = scheduler.run_once(&pipeline).await else {
                bail!("claim cycle failed");
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        let state = AppState {
            ledger,
            heartbeats,
            metrics,
            quarantine,
        };
        tokio::select! {
            res = start_server(&self.host, self.port, state) => {
                if let Err(e) = res {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
            }
            _ = scheduler.run(&pipeline) => {
                info!("Claim loop stopped, shutting down server");
            }
        }
        Ok(())
    }
}

fn build_adapter(
    chain: &ChainConfig,
    policy: &Policy,
    price_oracle: Arc<dyn PriceOracle>,
) -> Result<Arc<dyn ChainAdapter>, ClaimerError> {
    let chain_id = ChainId::new(&chain.name);
    let wallet = Wallet::new(&chain.private_key()?, chain.rpc_url()?)
        .map_err(|e| ClaimerError::Config(format!("chain {}: {e:#}", chain.name)))?;
    info!("Claiming on {} as {}", chain.name, wallet.address());

    let mut claim_builder = DistributorClaimBuilder::new();
    for (protocol, contract) in chain.distributor_addresses()? {
        claim_builder = claim_builder.with_distributor(&protocol, contract);
    }

    let mut adapter = EvmChainAdapter::new(
        chain_id.clone(),
        wallet,
        Arc::new(claim_builder),
        price_oracle,
        Address::new(&chain.native_token, chain_id.clone()),
        chain.native_decimals,
    );
    if let Some(secs) = chain.receipt_timeout_secs {
        adapter = adapter.with_receipt_timeout(Duration::from_secs(secs));
    }

    let profile = GasProfile::for_chain(&chain_id);
    Ok(Arc::new(CachedChainAdapter::new(
        adapter,
        policy.price_cache_ttl(),
        profile.fallback_gas_price_wei,
        profile.fallback_native_usd,
    )))
}
