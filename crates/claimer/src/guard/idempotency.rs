use crate::ledger::Ledger;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error};
use shared::models::{Address, ClaimBundle};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AlreadySucceeded,
    ItemsClaimed(Vec<String>),
    Cooldown {
        wallet: Address,
        protocol: String,
        last_claim: DateTime<Utc>,
    },
    LedgerUnavailable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadySucceeded => write!(f, "bundle already executed successfully"),
            SkipReason::ItemsClaimed(ids) => write!(f, "items already claimed: {ids:?}"),
            SkipReason::Cooldown {
                wallet,
                protocol,
                last_claim,
            } => write!(f, "{wallet} last claimed {protocol} at {last_claim}"),
            SkipReason::LedgerUnavailable(e) => write!(f, "ledger unavailable: {e}"),
        }
    }
}

/// Successful claims seen by this process, consulted before the ledger so a
/// claim whose ledger write was lost is still never resent.
#[derive(Default)]
struct Executed {
    bundles: HashSet<String>,
    items: HashSet<String>,
}

/// Decides whether a bundle must not run again. Any ledger error skips the
/// bundle for this cycle.
pub struct IdempotencyGuard {
    ledger: Arc<dyn Ledger>,
    cooldown: Duration,
    executed: Mutex<Executed>,
}

impl IdempotencyGuard {
    pub fn new(ledger: Arc<dyn Ledger>, cooldown: Duration) -> Self {
        Self {
            ledger,
            cooldown,
            executed: Mutex::new(Executed::default()),
        }
    }

    /// Marks a bundle and its items as claimed for the life of the process.
    pub fn remember_success(&self, bundle: &ClaimBundle) {
        let mut executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
        executed.bundles.insert(bundle.id.clone());
        executed.items.extend(bundle.item_ids());
    }

    fn executed_reason(&self, bundle: &ClaimBundle) -> Option<SkipReason> {
        let executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
        if executed.bundles.contains(&bundle.id) {
            return Some(SkipReason::AlreadySucceeded);
        }
        let claimed: Vec<String> = bundle
            .item_ids()
            .into_iter()
            .filter(|id| executed.items.contains(id))
            .collect();
        (!claimed.is_empty()).then_some(SkipReason::ItemsClaimed(claimed))
    }

    pub async fn should_skip(&self, bundle: &ClaimBundle) -> bool {
        self.should_skip_at(bundle, Utc::now()).await
    }

    pub async fn should_skip_at(&self, bundle: &ClaimBundle, now: DateTime<Utc>) -> bool {
        match self.skip_reason_at(bundle, now).await {
            Some(reason @ SkipReason::LedgerUnavailable(_)) => {
                error!("Skipping bundle {}: {reason}", bundle.id);
                true
            }
            Some(reason) => {
                debug!("Skipping bundle {}: {reason}", bundle.id);
                true
            }
            None => false,
        }
    }

    pub async fn skip_reason(&self, bundle: &ClaimBundle) -> Option<SkipReason> {
        self.skip_reason_at(bundle, Utc::now()).await
    }

    pub async fn skip_reason_at(
        &self,
        bundle: &ClaimBundle,
        now: DateTime<Utc>,
    ) -> Option<SkipReason> {
        if let Some(reason) = self.executed_reason(bundle) {
            return Some(reason);
        }

        match self.ledger.has_succeeded(&bundle.id).await {
            Ok(true) => return Some(SkipReason::AlreadySucceeded),
            Ok(false) => {}
            Err(e) => return Some(SkipReason::LedgerUnavailable(format!("{e:#}"))),
        }

        match self.ledger.claimed_items(&bundle.item_ids()).await {
            Ok(claimed) if !claimed.is_empty() => return Some(SkipReason::ItemsClaimed(claimed)),
            Ok(_) => {}
            Err(e) => return Some(SkipReason::LedgerUnavailable(format!("{e:#}"))),
        }

        let cutoff = now - self.cooldown;
        for item in &bundle.items {
            if let Some(last_claim) = item.last_claim_at.filter(|at| *at > cutoff) {
                return Some(SkipReason::Cooldown {
                    wallet: item.wallet.clone(),
                    protocol: item.protocol.clone(),
                    last_claim,
                });
            }
        }

        for wallet in bundle.wallets() {
            match self
                .ledger
                .last_claim_time_for(&wallet, &bundle.protocol)
                .await
            {
                Ok(Some(last_claim)) if last_claim > cutoff => {
                    return Some(SkipReason::Cooldown {
                        wallet,
                        protocol: bundle.protocol.clone(),
                        last_claim,
                    })
                }
                Ok(_) => {}
                Err(e) => return Some(SkipReason::LedgerUnavailable(format!("{e:#}"))),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::UnavailableLedger;
    use crate::ledger::MemoryLedger;
    use crate::testing::reward;
    use shared::models::ExecutionOutcome;

    fn bundle() -> ClaimBundle {
        ClaimBundle::new(vec![
            reward("1", "avalanche", "x", "0xdest"),
            reward("2", "avalanche", "x", "0xdest"),
        ])
        .unwrap()
    }

    fn guard(ledger: Arc<dyn Ledger>) -> IdempotencyGuard {
        IdempotencyGuard::new(ledger, Duration::days(1))
    }

    #[tokio::test]
    async fn test_fresh_bundle_runs() {
        let guard = guard(Arc::new(MemoryLedger::new()));
        assert_eq!(guard.skip_reason(&bundle()).await, None);
        assert!(!guard.should_skip(&bundle()).await);
    }

    #[tokio::test]
    async fn test_succeeded_bundle_is_skipped() {
        let ledger = Arc::new(MemoryLedger::new());
        let bundle = bundle();
        ledger
            .record(
                &bundle,
                &ExecutionOutcome::succeeded("0x1", None, None, 2.0),
            )
            .await
            .unwrap();

        let guard = guard(ledger);
        assert_eq!(
            guard.skip_reason(&bundle).await,
            Some(SkipReason::AlreadySucceeded)
        );
    }

    #[tokio::test]
    async fn test_failed_bundle_may_run_again() {
        let ledger = Arc::new(MemoryLedger::new());
        let bundle = bundle();
        ledger
            .record(
                &bundle,
                &ExecutionOutcome::failed(shared::models::ErrorKind::Transient, "timeout"),
            )
            .await
            .unwrap();
        assert!(!guard(ledger).should_skip(&bundle).await);
    }

    #[tokio::test]
    async fn test_claimed_item_blocks_new_bundle() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .mark_claimed(&["2".to_string()], Utc::now())
            .await
            .unwrap();
        let reason = guard(ledger).skip_reason(&bundle()).await;
        assert_eq!(reason, Some(SkipReason::ItemsClaimed(vec!["2".to_string()])));
    }

    #[tokio::test]
    async fn test_recent_item_claim_triggers_cooldown() {
        let now = Utc::now();
        let mut items = vec![
            reward("1", "avalanche", "x", "0xdest"),
            reward("2", "avalanche", "x", "0xdest"),
        ];
        items[1].last_claim_at = Some(now - Duration::hours(2));
        let bundle = ClaimBundle::new(items).unwrap();
        let guard = guard(Arc::new(MemoryLedger::new()));

        assert!(matches!(
            guard.skip_reason_at(&bundle, now).await,
            Some(SkipReason::Cooldown { .. })
        ));
        assert_eq!(
            guard
                .skip_reason_at(&bundle, now + Duration::hours(23))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_ledger_claim_time_triggers_cooldown_per_protocol() {
        let ledger = Arc::new(MemoryLedger::new());
        let claimed = ClaimBundle::new(vec![reward("9", "avalanche", "x", "0xdest")]).unwrap();
        ledger
            .record(&claimed, &ExecutionOutcome::succeeded("0x1", None, None, 1.0))
            .await
            .unwrap();
        let guard = guard(ledger);

        assert!(matches!(
            guard.skip_reason(&bundle()).await,
            Some(SkipReason::Cooldown { .. })
        ));

        let other_protocol =
            ClaimBundle::new(vec![reward("10", "avalanche", "y", "0xdest")]).unwrap();
        assert_eq!(guard.skip_reason(&other_protocol).await, None);
    }

    #[tokio::test]
    async fn test_remembered_success_skips_without_ledger_marker() {
        let guard = guard(Arc::new(MemoryLedger::new()));
        let claimed = bundle();
        guard.remember_success(&claimed);

        assert_eq!(
            guard.skip_reason(&claimed).await,
            Some(SkipReason::AlreadySucceeded)
        );

        let overlapping = ClaimBundle::new(vec![
            reward("2", "avalanche", "x", "0xdest"),
            reward("9", "avalanche", "x", "0xdest"),
        ])
        .unwrap();
        assert_eq!(
            guard.skip_reason(&overlapping).await,
            Some(SkipReason::ItemsClaimed(vec!["2".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_ledger_failure_fails_closed() {
        let guard = guard(Arc::new(UnavailableLedger));
        assert!(matches!(
            guard.skip_reason(&bundle()).await,
            Some(SkipReason::LedgerUnavailable(_))
        ));
        assert!(guard.should_skip(&bundle()).await);
    }
}
