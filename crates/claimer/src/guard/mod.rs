pub mod idempotency;
pub mod quarantine;

pub use idempotency::{IdempotencyGuard, SkipReason};
pub use quarantine::{QuarantineEntry, QuarantineTracker};
