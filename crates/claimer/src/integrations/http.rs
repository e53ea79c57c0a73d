use crate::integrations::traits::RewardSource;
use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Serialize;
use shared::models::api::ApiResponse;
use shared::models::{Address, ChainId, RewardItem};
use shared::pricing::PriceOracle;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Serialize)]
struct RewardsQuery<'a> {
    wallets: &'a [Address],
}

/// Reward discovery service for one protocol, speaking the `ApiResponse`
/// envelope:
///
/// - `GET {base}/wallets` lists wallets with claimable rewards
/// - `POST {base}/rewards` with `{"wallets": [...]}` returns pending items
pub struct HttpRewardSource {
    client: Client,
    protocol: String,
    base_url: String,
}

impl HttpRewardSource {
    pub fn new(protocol: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            protocol: protocol.to_string(),
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl RewardSource for HttpRewardSource {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn discover_wallets(&self) -> Result<Vec<Address>> {
        let url = format!("{}/wallets", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{}: failed to reach {url}", self.protocol))?
            .error_for_status()?;
        let body: ApiResponse<Vec<Address>> = response
            .json()
            .await
            .with_context(|| format!("{}: unreadable wallet list", self.protocol))?;
        if !body.success {
            bail!("{}: wallet discovery reported failure", self.protocol);
        }
        debug!("{}: discovered {} wallets", self.protocol, body.data.len());
        Ok(body.data)
    }

    async fn get_pending_rewards(&self, wallets: &[Address]) -> Result<Vec<RewardItem>> {
        if wallets.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/rewards", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RewardsQuery { wallets })
            .send()
            .await
            .with_context(|| format!("{}: failed to reach {url}", self.protocol))?
            .error_for_status()?;
        let body: ApiResponse<Vec<RewardItem>> = response
            .json()
            .await
            .with_context(|| format!("{}: unreadable reward list", self.protocol))?;
        if !body.success {
            bail!("{}: reward lookup reported failure", self.protocol);
        }
        Ok(body.data)
    }
}

/// USD quotes from `GET {base}/price?chain=..&token=..&amount_wei=..`.
/// Every failure is logged and reported as unpriced (0.0).
pub struct HttpPriceOracle {
    client: Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: trim_base(base_url),
        })
    }

    async fn fetch(&self, chain: &ChainId, token: &Address, amount_wei: &str) -> Result<f64> {
        let url = format!("{}/price", self.base_url);
        let body: ApiResponse<f64> = self
            .client
            .get(&url)
            .query(&[
                ("chain", chain.as_str()),
                ("token", token.value.as_str()),
                ("amount_wei", amount_wei),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !body.success {
            bail!("price service reported failure");
        }
        Ok(body.data)
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn quote_to_usd(&self, chain: &ChainId, token: &Address, amount_wei: &str) -> f64 {
        match self.fetch(chain, token, amount_wei).await {
            Ok(usd) if usd.is_finite() && usd >= 0.0 => usd,
            Ok(usd) => {
                warn!("Price for {token} is invalid ({usd}), treating as unpriced");
                0.0
            }
            Err(e) => {
                warn!("Failed to price {amount_wei} of {token}: {e:#}");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn avalanche(value: &str) -> Address {
        Address::new(value, ChainId::new("avalanche"))
    }

    #[tokio::test]
    async fn test_discover_wallets() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/wallets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "data": [{"value": "0xw1", "chain": "avalanche"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = HttpRewardSource::new("x", &format!("{}/", server.url()))?;
        let wallets = source.discover_wallets().await?;
        assert_eq!(wallets, vec![avalanche("0xw1")]);
        assert_eq!(source.protocol(), "x");
        Ok(())
    }

    #[tokio::test]
    async fn test_get_pending_rewards_posts_wallets() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/rewards")
            .match_body(Matcher::Json(json!({
                "wallets": [{"value": "0xw1", "chain": "avalanche"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "data": [{
                        "id": "r-1",
                        "wallet": {"value": "0xw1", "chain": "avalanche"},
                        "protocol": "x",
                        "token": {"value": "0xt", "chain": "avalanche"},
                        "amount_wei": "1000000000000000000",
                        "amount_usd": 1.25,
                        "claim_to": {"value": "0xw1", "chain": "avalanche"},
                        "discovered_at": "2025-01-01T00:00:00Z"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = HttpRewardSource::new("x", &server.url())?;
        let items = source.get_pending_rewards(&[avalanche("0xw1")]).await?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "r-1");
        assert_eq!(items[0].amount_usd, 1.25);
        Ok(())
    }

    #[tokio::test]
    async fn test_source_errors_propagate() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/wallets")
            .with_status(503)
            .create_async()
            .await;

        let source = HttpRewardSource::new("x", &server.url())?;
        assert!(source.discover_wallets().await.is_err());
        assert!(source.get_pending_rewards(&[]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_price_oracle_quotes() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/price")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chain".into(), "avalanche".into()),
                Matcher::UrlEncoded("token".into(), "0xt".into()),
                Matcher::UrlEncoded("amount_wei".into(), "5".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"success": true, "data": 12.5}).to_string())
            .create_async()
            .await;

        let oracle = HttpPriceOracle::new(&server.url())?;
        let usd = oracle
            .quote_to_usd(&ChainId::new("avalanche"), &avalanche("0xt"), "5")
            .await;
        assert_eq!(usd, 12.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_price_oracle_failure_is_unpriced() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/price")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let oracle = HttpPriceOracle::new(&server.url())?;
        let usd = oracle
            .quote_to_usd(&ChainId::new("avalanche"), &avalanche("0xt"), "5")
            .await;
        assert_eq!(usd, 0.0);
        Ok(())
    }
}
