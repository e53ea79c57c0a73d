pub mod api;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod integrations;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod profitability;
pub mod scheduler;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

pub use cli::Cli;
pub use config::ClaimerConfig;
pub use error::ClaimerError;
pub use pipeline::{ClaimPipeline, CycleReport, CycleRunner};
pub use policy::Policy;
pub use scheduler::{Scheduler, SchedulerState};
