use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub last_cycle_seconds_ago: i64,
    pub last_cycle_duration_ms: u64,
    pub cycles_completed: u64,
}

/// Liveness of the claim loop: when the last cycle finished and how long it took.
pub struct LoopHeartbeats {
    last_cycle: AtomicI64,
    last_cycle_duration_ms: AtomicU64,
    cycles_completed: AtomicU64,
    max_silence: Duration,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl LoopHeartbeats {
    /// `tick_interval` is the scheduler's base interval; the loop counts as
    /// stalled after three intervals without a completed cycle.
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            last_cycle: AtomicI64::new(-1),
            last_cycle_duration_ms: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            max_silence: tick_interval.saturating_mul(3),
        }
    }

    pub fn update_cycle(&self, duration: Duration) {
        self.last_cycle.store(now_secs(), Ordering::SeqCst);
        self.last_cycle_duration_ms
            .store(duration.as_millis() as u64, Ordering::SeqCst);
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn health_status(&self) -> HealthStatus {
        let last = self.last_cycle.load(Ordering::SeqCst);
        let seconds_ago = if last > 0 { now_secs() - last } else { -1 };

        let healthy = seconds_ago != -1 && seconds_ago <= self.max_silence.as_secs() as i64;

        HealthStatus {
            healthy,
            last_cycle_seconds_ago: seconds_ago,
            last_cycle_duration_ms: self.last_cycle_duration_ms.load(Ordering::SeqCst),
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
        }
    }
}
