use crate::error::ClaimerError;
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_QUARANTINE_HOURS: u64 = 24 * 365;

/// Thresholds shared by every stage of the claim pipeline.
///
/// Bundle sizes and the gross/net profitability floors have no defaults: a
/// config that omits them fails to parse instead of silently claiming at a loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default = "default_min_item_usd")]
    pub min_item_usd: f64,
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: u32,
    pub min_bundle_size: usize,
    pub max_bundle_size: usize,
    pub min_bundle_gross_usd: f64,
    pub min_bundle_net_usd: f64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    #[serde(default = "default_schedule_tick_interval_ms")]
    pub schedule_tick_interval_ms: u64,
    #[serde(default = "default_schedule_jitter_ms")]
    pub schedule_jitter_ms: u64,
    #[serde(default = "default_quarantine_failure_threshold")]
    pub quarantine_failure_threshold: u32,
    #[serde(default = "default_quarantine_base_minutes")]
    pub quarantine_base_minutes: u64,
    #[serde(default = "default_quarantine_max_hours")]
    pub quarantine_max_hours: u64,
    #[serde(default = "default_price_cache_ttl_secs")]
    pub price_cache_ttl_secs: u64,
}

fn default_min_item_usd() -> f64 {
    0.10
}
fn default_cooldown_days() -> u32 {
    1
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    2_000
}
fn default_retry_max_delay_ms() -> u64 {
    30_000
}
fn default_retry_jitter_ms() -> u64 {
    500
}
fn default_schedule_tick_interval_ms() -> u64 {
    15 * 60 * 1_000
}
fn default_schedule_jitter_ms() -> u64 {
    60_000
}
fn default_quarantine_failure_threshold() -> u32 {
    5
}
fn default_quarantine_base_minutes() -> u64 {
    60
}
fn default_quarantine_max_hours() -> u64 {
    7 * 24
}
fn default_price_cache_ttl_secs() -> u64 {
    30
}

impl Policy {
    pub fn validate(&self) -> Result<(), ClaimerError> {
        let invalid = |msg: String| Err(ClaimerError::InvalidPolicy(msg));

        for (name, value) in [
            ("min_item_usd", self.min_item_usd),
            ("min_bundle_gross_usd", self.min_bundle_gross_usd),
            ("min_bundle_net_usd", self.min_bundle_net_usd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        if self.min_bundle_size == 0 {
            return invalid("min_bundle_size must be at least 1".to_string());
        }
        if self.max_bundle_size < self.min_bundle_size {
            return invalid(format!(
                "max_bundle_size ({}) is smaller than min_bundle_size ({})",
                self.max_bundle_size, self.min_bundle_size
            ));
        }
        if self.retry_max_attempts == 0 {
            return invalid("retry_max_attempts must be at least 1".to_string());
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return invalid(format!(
                "retry_max_delay_ms ({}) is smaller than retry_base_delay_ms ({})",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            ));
        }
        if self.schedule_tick_interval_ms == 0 {
            return invalid("schedule_tick_interval_ms must be positive".to_string());
        }
        if self.quarantine_failure_threshold == 0 {
            return invalid("quarantine_failure_threshold must be at least 1".to_string());
        }
        if self.quarantine_base_minutes == 0
            || self.quarantine_max_hours.saturating_mul(60) < self.quarantine_base_minutes
        {
            return invalid(format!(
                "quarantine window {}m..{}h is empty",
                self.quarantine_base_minutes, self.quarantine_max_hours
            ));
        }
        if self.quarantine_max_hours > MAX_QUARANTINE_HOURS {
            return invalid(format!(
                "quarantine_max_hours ({}) exceeds {MAX_QUARANTINE_HOURS}",
                self.quarantine_max_hours
            ));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> ChronoDuration {
        ChronoDuration::days(i64::from(self.cooldown_days))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_tick_interval_ms)
    }

    pub fn tick_jitter(&self) -> Duration {
        Duration::from_millis(self.schedule_jitter_ms)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }
}

#[cfg(test)]
impl Policy {
    /// Permissive thresholds with instant retries.
    pub(crate) fn for_tests() -> Self {
        Self {
            min_item_usd: 0.01,
            cooldown_days: 1,
            min_bundle_size: 2,
            max_bundle_size: 10,
            min_bundle_gross_usd: 2.0,
            min_bundle_net_usd: 1.0,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            retry_jitter_ms: 0,
            schedule_tick_interval_ms: 10,
            schedule_jitter_ms: 0,
            quarantine_failure_threshold: 5,
            quarantine_base_minutes: 60,
            quarantine_max_hours: 24,
            price_cache_ttl_secs: 30,
        }
    }
}
