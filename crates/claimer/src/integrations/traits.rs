use anyhow::Result;
use async_trait::async_trait;
use shared::models::{Address, RewardItem};

/// Per-protocol discovery of claimable rewards.
#[async_trait]
pub trait RewardSource: Send + Sync {
    fn protocol(&self) -> &str;

    async fn discover_wallets(&self) -> Result<Vec<Address>>;

    async fn get_pending_rewards(&self, wallets: &[Address]) -> Result<Vec<RewardItem>>;
}
