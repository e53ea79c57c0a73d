use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context as _, Result};
use url::Url;

/// Signing account plus a provider that fills nonce, gas and chain id and
/// signs with that account.
#[derive(Clone)]
pub struct Wallet {
    pub signer: PrivateKeySigner,
    pub provider: DynProvider,
}

impl Wallet {
    pub fn new(private_key: &str, provider_url: Url) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .context("failed to parse private key")?;
        let wallet = EthereumWallet::from(signer.clone());

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(provider_url)
            .erased();

        Ok(Self { signer, provider })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}
