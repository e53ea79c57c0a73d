use crate::policy::Policy;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;
use shared::models::Address;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarantineEntry {
    pub wallet: Address,
    pub failure_count: u32,
    pub quarantined_until: Option<DateTime<Utc>>,
    /// Times this wallet has been quarantined; each offense doubles the window.
    pub offenses: u32,
}

impl QuarantineEntry {
    fn new(wallet: Address) -> Self {
        Self {
            wallet,
            failure_count: 0,
            quarantined_until: None,
            offenses: 0,
        }
    }
}

/// In-process record of wallets whose claims keep failing.
pub struct QuarantineTracker {
    threshold: u32,
    base_window: Duration,
    max_window: Duration,
    entries: Mutex<HashMap<Address, QuarantineEntry>>,
}

impl QuarantineTracker {
    pub fn new(threshold: u32, base_window: Duration, max_window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            base_window,
            max_window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(
            policy.quarantine_failure_threshold,
            Duration::minutes(policy.quarantine_base_minutes as i64),
            Duration::hours(policy.quarantine_max_hours as i64),
        )
    }

    /// Recovers the map from a poisoned lock so quarantines stay in force.
    fn entries(&self) -> MutexGuard<'_, HashMap<Address, QuarantineEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window(&self, offenses: u32) -> Duration {
        let factor = 1i32.checked_shl(offenses.min(30)).unwrap_or(i32::MAX);
        self.base_window
            .checked_mul(factor)
            .map_or(self.max_window, |w| w.min(self.max_window))
    }

    pub fn is_wallet_quarantined(&self, wallet: &Address) -> bool {
        self.is_wallet_quarantined_at(wallet, Utc::now())
    }

    pub fn is_wallet_quarantined_at(&self, wallet: &Address, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(wallet) else {
            return false;
        };
        match entry.quarantined_until {
            Some(until) if until > now => true,
            Some(_) => {
                info!("Wallet {wallet} released from quarantine");
                entry.quarantined_until = None;
                false
            }
            None => false,
        }
    }

    pub fn record_failure(&self, wallet: &Address) {
        self.record_failure_at(wallet, Utc::now());
    }

    pub fn record_failure_at(&self, wallet: &Address, now: DateTime<Utc>) {
        let mut entries = self.entries();
        let entry = entries
            .entry(wallet.clone())
            .or_insert_with(|| QuarantineEntry::new(wallet.clone()));
        entry.failure_count += 1;

        if entry.failure_count >= self.threshold {
            let window = self.window(entry.offenses);
            entry.quarantined_until = Some(now + window);
            entry.offenses += 1;
            entry.failure_count = 0;
            warn!(
                "Wallet {wallet} quarantined for {} minutes (offense #{})",
                window.num_minutes(),
                entry.offenses
            );
        }
    }

    pub fn record_success(&self, wallet: &Address) {
        self.entries().remove(wallet);
    }

    pub fn entry(&self, wallet: &Address) -> Option<QuarantineEntry> {
        self.entries().get(wallet).cloned()
    }

    /// Wallets currently serving a quarantine window.
    pub fn quarantined_at(&self, now: DateTime<Utc>) -> Vec<QuarantineEntry> {
        self.entries()
            .values()
            .filter(|e| e.quarantined_until.is_some_and(|until| until > now))
            .cloned()
            .collect()
    }
}
