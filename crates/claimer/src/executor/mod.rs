pub mod retry;

use crate::executor::retry::{with_exponential_backoff, BackoffPolicy};
use log::{info, warn};
use shared::models::{ClaimBundle, ErrorKind, ExecutionOutcome, SimulationResult};
use shared::web3::ChainAdapter;

/// Two-phase execution of a single bundle: a read-only simulation, then a
/// retried send when the simulation passes.
pub struct Executor {
    backoff: BackoffPolicy,
}

impl Executor {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self { backoff }
    }

    pub async fn simulate(&self, bundle: &ClaimBundle, adapter: &dyn ChainAdapter) -> SimulationResult {
        match adapter.simulate(bundle).await {
            Ok(result) => result,
            Err(e) => SimulationResult::rejected(e.to_string()),
        }
    }

    pub async fn send(&self, bundle: &ClaimBundle, adapter: &dyn ChainAdapter) -> ExecutionOutcome {
        match adapter.send(bundle).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        }
    }

    pub async fn execute(
        &self,
        bundle: &ClaimBundle,
        adapter: &dyn ChainAdapter,
        key: &str,
    ) -> ExecutionOutcome {
        let simulation = self.simulate(bundle, adapter).await;
        if !simulation.ok {
            let reason = simulation.reason.unwrap_or_else(|| "no reason given".to_string());
            warn!("[{key}] simulation failed for bundle {}: {reason}", bundle.id);
            let mut outcome = ExecutionOutcome::failed(
                ErrorKind::TerminalRejected,
                format!("simulation failed: {reason}"),
            );
            outcome.attempts = 0;
            return outcome;
        }

        let outcome =
            with_exponential_backoff(move |_| self.send(bundle, adapter), &self.backoff, key).await;

        if outcome.success {
            info!(
                "[{key}] claimed bundle {} ({} items, ${:.2}) in tx {} after {} attempt(s)",
                bundle.id,
                bundle.len(),
                outcome.claimed_usd,
                outcome.tx_hash.as_deref().unwrap_or("-"),
                outcome.attempts
            );
        } else {
            warn!(
                "[{key}] bundle {} failed after {} attempt(s) [{}]: {}",
                bundle.id,
                outcome.attempts,
                outcome
                    .error_kind
                    .map(|k| k.to_string())
                    .unwrap_or_default(),
                outcome.error.as_deref().unwrap_or("-")
            );
        }
        outcome
    }
}
