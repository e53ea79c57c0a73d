use crate::metrics::MetricsContext;
use crate::pipeline::{CycleReport, CycleRunner};
use crate::utils::loop_heartbeats::LoopHeartbeats;
use futures::FutureExt as _;
use log::{error, info};
use rand::Rng;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Drives claim cycles back to back with `interval + U[0, jitter]` of sleep
/// after each one. Cancellation is observed only between cycles.
pub struct Scheduler {
    interval: Duration,
    jitter: Duration,
    cancellation_token: CancellationToken,
    running: AtomicBool,
    heartbeats: Option<Arc<LoopHeartbeats>>,
    metrics: Option<Arc<MetricsContext>>,
}

impl Scheduler {
    pub fn new(interval: Duration, jitter: Duration, cancellation_token: CancellationToken) -> Self {
        Self {
            interval,
            jitter,
            cancellation_token,
            running: AtomicBool::new(false),
            heartbeats: None,
            metrics: None,
        }
    }

    pub fn with_heartbeats(mut self, heartbeats: Arc<LoopHeartbeats>) -> Self {
        self.heartbeats = Some(heartbeats);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsContext>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Asks the loop to stop; a cycle in flight still runs to completion.
    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Runs one cycle. Errors and panics are logged and reported as `None`.
    /// Only a completed cycle refreshes the heartbeat.
    pub async fn run_once<C>(&self, cycle: &C) -> Option<CycleReport>
    where
        C: CycleRunner + ?Sized,
    {
        self.running.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let result = AssertUnwindSafe(cycle.run_cycle()).catch_unwind().await;
        let elapsed = started.elapsed();
        self.running.store(false, Ordering::SeqCst);

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle(elapsed.as_secs_f64());
        }

        match result {
            Ok(Ok(report)) => {
                if let Some(heartbeats) = &self.heartbeats {
                    heartbeats.update_cycle(elapsed);
                }
                info!(
                    "Cycle finished in {elapsed:?}: {} bundles, {} claimed (${:.2}), {} failed, {} skipped, {} unprofitable",
                    report.bundles_built,
                    report.claimed,
                    report.claimed_usd,
                    report.failed,
                    report.skipped,
                    report.unprofitable
                );
                Some(report)
            }
            Ok(Err(e)) => {
                error!("Cycle failed after {elapsed:?}: {e:#}");
                None
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Cycle panicked after {elapsed:?}: {message}");
                None
            }
        }
    }

    pub async fn run<C>(&self, cycle: &C)
    where
        C: CycleRunner + ?Sized,
    {
        info!(
            "Scheduler started: interval {:?}, jitter up to {:?}",
            self.interval, self.jitter
        );
        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            self.run_once(cycle).await;

            let sleep = tokio::time::sleep(self.next_delay());
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = sleep => {}
            }
        }
        info!("Scheduler stopped");
    }
}
