use crate::error::ClaimerError;
use crate::policy::Policy;
use alloy::primitives::Address as EvmAddress;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use url::Url;

const NATIVE_TOKEN_PLACEHOLDER: &str = "0x0000000000000000000000000000000000000000";

/// Everything the claimer process reads from its TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimerConfig {
    pub policy: Policy,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub pricing: Option<PricingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    /// Name of the env var holding the signer key. Keys never live in the file.
    pub private_key_env: String,
    #[serde(default = "default_native_token")]
    pub native_token: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    /// protocol -> distributor contract
    #[serde(default)]
    pub distributors: HashMap<String, String>,
    pub receipt_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub protocol: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    pub url: String,
}

fn default_native_token() -> String {
    NATIVE_TOKEN_PLACEHOLDER.to_string()
}

fn default_native_decimals() -> u8 {
    18
}

impl ClaimerConfig {
    pub fn load(path: &Path) -> Result<Self, ClaimerError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ClaimerError> {
        let config: ClaimerConfig =
            toml::from_str(raw).map_err(|e| ClaimerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClaimerError> {
        self.policy.validate()?;

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.name.as_str()) {
                return Err(ClaimerError::Config(format!(
                    "chain {} is configured more than once",
                    chain.name
                )));
            }
            chain.rpc_url()?;
            chain.distributor_addresses()?;
            if chain.private_key_env.trim().is_empty() {
                return Err(ClaimerError::Config(format!(
                    "chain {}: private_key_env is empty",
                    chain.name
                )));
            }
        }

        let mut protocols = HashSet::new();
        for source in &self.sources {
            if !protocols.insert(source.protocol.as_str()) {
                return Err(ClaimerError::Config(format!(
                    "source for protocol {} is configured more than once",
                    source.protocol
                )));
            }
            parse_url(&source.url, &format!("source {}", source.protocol))?;
        }

        if let Some(pricing) = &self.pricing {
            parse_url(&pricing.url, "pricing")?;
        }
        Ok(())
    }
}

impl ChainConfig {
    pub fn rpc_url(&self) -> Result<Url, ClaimerError> {
        parse_url(&self.rpc_url, &format!("chain {}", self.name))
    }

    pub fn distributor_addresses(&self) -> Result<Vec<(String, EvmAddress)>, ClaimerError> {
        self.distributors
            .iter()
            .map(|(protocol, address)| {
                EvmAddress::from_str(address)
                    .map(|parsed| (protocol.clone(), parsed))
                    .map_err(|e| {
                        ClaimerError::Config(format!(
                            "chain {}: invalid distributor for {protocol}: {e}",
                            self.name
                        ))
                    })
            })
            .collect()
    }

    pub fn private_key(&self) -> Result<String, ClaimerError> {
        match std::env::var(&self.private_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ClaimerError::Config(format!(
                "chain {}: env var {} is not set",
                self.name, self.private_key_env
            ))),
        }
    }
}

fn parse_url(raw: &str, what: &str) -> Result<Url, ClaimerError> {
    Url::parse(raw).map_err(|e| ClaimerError::Config(format!("{what}: invalid url {raw}: {e}")))
}
