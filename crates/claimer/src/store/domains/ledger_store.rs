use crate::ledger::{Ledger, LedgerRecord};
use crate::store::core::RedisStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::warn;
use redis::AsyncCommands;
use shared::models::{Address, ClaimBundle, ExecutionOutcome};
use std::collections::HashMap;
use std::sync::Arc;

const OUTCOMES_KEY: &str = "claimer:outcomes";
const BUNDLE_SUCCESS_KEY: &str = "claimer:bundle:success";
const LAST_CLAIM_KEY: &str = "claimer:last_claim";
const ITEM_CLAIMED_KEY: &str = "claimer:item:claimed";
const OUTCOME_RETENTION_DAYS: i64 = 30;
const DEFAULT_MARKER_TTL_DAYS: i64 = 90;

fn last_claim_key(wallet: &Address) -> String {
    format!("{LAST_CLAIM_KEY}:{}:{}", wallet.chain, wallet.value)
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("timestamp {millis} out of range"))
}

/// Ledger backed by Redis.
///
/// Outcomes live in a sorted set scored by record time. Success markers,
/// per-wallet last-claim hashes (field = protocol) and item markers are plain
/// keys written in the same MULTI/EXEC as the outcome. Marker keys expire
/// after `marker_ttl`, which always outlives twice the claim cooldown.
pub struct RedisLedger {
    redis: Arc<RedisStore>,
    marker_ttl: Duration,
}

impl RedisLedger {
    pub fn new(redis: Arc<RedisStore>) -> Self {
        Self {
            redis,
            marker_ttl: Duration::days(DEFAULT_MARKER_TTL_DAYS),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.marker_ttl = self.marker_ttl.max(cooldown * 2);
        self
    }

    fn marker_ttl_secs(&self) -> u64 {
        self.marker_ttl.num_seconds().max(1).unsigned_abs()
    }
}

#[async_trait]
impl Ledger for RedisLedger {
    async fn record(&self, bundle: &ClaimBundle, outcome: &ExecutionOutcome) -> Result<()> {
        let now = Utc::now();
        let record = LedgerRecord::new(bundle, outcome, now);
        let payload = serde_json::to_string(&record)?;
        let now_ms = now.timestamp_millis();
        let retention_cutoff = (now - Duration::days(OUTCOME_RETENTION_DAYS)).timestamp_millis();

        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zadd(OUTCOMES_KEY, payload, now_ms);
        pipe.zrembyscore(OUTCOMES_KEY, "-inf", retention_cutoff);

        if outcome.success {
            let ttl = self.marker_ttl_secs();
            pipe.set_ex(
                format!("{BUNDLE_SUCCESS_KEY}:{}", bundle.id),
                outcome.tx_hash.as_deref().unwrap_or_default(),
                ttl,
            );
            for wallet in bundle.wallets() {
                let key = last_claim_key(&wallet);
                pipe.hset(&key, &bundle.protocol, now_ms);
                pipe.expire(&key, ttl as i64);
            }
        }

        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn mark_claimed(&self, item_ids: &[String], at: DateTime<Utc>) -> Result<()> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let at_ms = at.timestamp_millis();
        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let ttl = self.marker_ttl_secs();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in item_ids {
            pipe.set_ex(format!("{ITEM_CLAIMED_KEY}:{id}"), at_ms, ttl);
        }
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn get_recent(&self, hours_back: u32) -> Result<Vec<LedgerRecord>> {
        let cutoff = (Utc::now() - Duration::hours(i64::from(hours_back))).timestamp_millis();
        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = con.zrevrangebyscore(OUTCOMES_KEY, "+inf", cutoff).await?;

        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str::<LedgerRecord>(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable ledger entry: {e}");
                    None
                }
            })
            .collect())
    }

    async fn last_claim_time(&self, wallet: &Address) -> Result<Option<DateTime<Utc>>> {
        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let by_protocol: HashMap<String, i64> = con.hgetall(last_claim_key(wallet)).await?;
        by_protocol
            .into_values()
            .max()
            .map(from_millis)
            .transpose()
    }

    async fn last_claim_time_for(
        &self,
        wallet: &Address,
        protocol: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let millis: Option<i64> = con.hget(last_claim_key(wallet), protocol).await?;
        millis.map(from_millis).transpose()
    }

    async fn has_succeeded(&self, bundle_id: &str) -> Result<bool> {
        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let exists: bool = con
            .exists(format!("{BUNDLE_SUCCESS_KEY}:{bundle_id}"))
            .await?;
        Ok(exists)
    }

    async fn claimed_items(&self, item_ids: &[String]) -> Result<Vec<String>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.redis.client.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in item_ids {
            pipe.exists(format!("{ITEM_CLAIMED_KEY}:{id}"));
        }
        let flags: Vec<bool> = pipe.query_async(&mut con).await?;

        Ok(item_ids
            .iter()
            .zip(flags)
            .filter(|(_, claimed)| *claimed)
            .map(|(id, _)| id.clone())
            .collect())
    }
}
