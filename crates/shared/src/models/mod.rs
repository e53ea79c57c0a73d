pub mod api;
pub mod bundle;
pub mod outcome;
pub mod reward;

pub use bundle::ClaimBundle;
pub use outcome::{ErrorKind, ExecutionOutcome, SimulationResult};
pub use reward::{Address, ChainId, RewardItem};
