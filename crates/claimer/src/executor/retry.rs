use crate::policy::Policy;
use log::{debug, warn};
use rand::Rng;
use shared::models::ExecutionOutcome;
use std::future::Future;
use std::time::Duration;

/// Anything a retried operation can produce. Only transient failures are
/// retried; every other value ends the loop immediately.
pub trait RetryOutcome {
    fn is_transient(&self) -> bool;

    fn describe(&self) -> String;

    /// Called once with the number of attempts spent producing this value.
    fn record_attempts(&mut self, _attempts: u32) {}
}

impl RetryOutcome for ExecutionOutcome {
    fn is_transient(&self) -> bool {
        self.is_transient_failure()
    }

    fn describe(&self) -> String {
        match (&self.tx_hash, &self.error) {
            (Some(hash), _) => format!("success {hash}"),
            (None, Some(error)) => error.clone(),
            (None, None) => "failed".to_string(),
        }
    }

    fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            max_attempts: policy.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(policy.retry_base_delay_ms),
            max_delay: Duration::from_millis(policy.retry_max_delay_ms),
            max_jitter: Duration::from_millis(policy.retry_jitter_ms),
        }
    }

    /// Deterministic part of the wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}

/// Runs `operation` until it yields a non-transient value or `max_attempts`
/// is spent, sleeping `delay_for(n) + jitter` between attempts. The final
/// value is returned as produced, with the attempt count recorded on it.
pub async fn with_exponential_backoff<F, Fut, T>(
    mut operation: F,
    policy: &BackoffPolicy,
    key: &str,
) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    T: RetryOutcome,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let mut result = operation(attempt).await;
        if !result.is_transient() {
            result.record_attempts(attempt);
            return result;
        }
        if attempt >= max_attempts {
            warn!(
                "[{key}] giving up after {attempt} attempts: {}",
                result.describe()
            );
            result.record_attempts(attempt);
            return result;
        }

        let delay = policy.delay_for(attempt) + policy.jitter();
        debug!(
            "[{key}] attempt {attempt}/{max_attempts} failed ({}), retrying in {delay:?}",
            result.describe()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
