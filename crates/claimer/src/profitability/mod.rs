use crate::policy::Policy;
use log::{debug, warn};
use shared::models::{ChainId, ClaimBundle};
use shared::web3::units::{gas_cost_wei, to_decimal};
use shared::web3::ChainAdapter;
use std::fmt;

/// Static gas model for one chain, used when live prices are unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasProfile {
    pub base_units: u64,
    pub per_extra_units: u64,
    pub fallback_gas_price_wei: u128,
    pub fallback_native_usd: f64,
    pub native_decimals: u8,
}

const GWEI: u128 = 1_000_000_000;

impl GasProfile {
    pub fn for_chain(chain: &ChainId) -> Self {
        let (base_units, per_extra_units, fallback_gas_price_wei, fallback_native_usd) =
            match chain.as_str() {
                "ethereum" => (150_000, 60_000, 30 * GWEI, 3_500.0),
                "arbitrum" => (400_000, 120_000, GWEI / 10, 3_500.0),
                "optimism" => (150_000, 60_000, GWEI / 100, 3_500.0),
                "base" => (150_000, 60_000, GWEI / 100, 3_500.0),
                "polygon" => (150_000, 60_000, 100 * GWEI, 1.0),
                "avalanche" => (150_000, 60_000, 30 * GWEI, 40.0),
                "bsc" => (150_000, 60_000, 3 * GWEI, 600.0),
                // unknown chains get pessimistic defaults
                _ => (200_000, 80_000, 50 * GWEI, 3_500.0),
            };
        Self {
            base_units,
            per_extra_units,
            fallback_gas_price_wei,
            fallback_native_usd,
            native_decimals: 18,
        }
    }

    pub fn gas_units(&self, item_count: usize) -> u64 {
        let extra = item_count.saturating_sub(1) as u64;
        self.base_units
            .saturating_add(extra.saturating_mul(self.per_extra_units))
    }

    pub fn gas_usd(&self, item_count: usize, gas_price_wei: u128, native_usd: f64) -> f64 {
        let wei = gas_cost_wei(self.gas_units(item_count), gas_price_wei);
        to_decimal(wei, self.native_decimals) * native_usd
    }
}

/// Estimated USD cost of claiming `bundle` in one transaction.
///
/// Live inputs come from `adapter`; any input that errors or comes back as
/// zero, negative or non-finite is replaced by the chain's static fallback.
pub async fn estimate_bundle_gas_usd(
    bundle: &ClaimBundle,
    adapter: Option<&dyn ChainAdapter>,
) -> f64 {
    let profile = GasProfile::for_chain(&bundle.chain);

    let (gas_price, native_usd) = match adapter {
        Some(adapter) => {
            let gas_price = match adapter.gas_price().await {
                Ok(price) if price > 0 => price,
                Ok(_) => {
                    warn!("{}: gas price query returned zero, using fallback", bundle.chain);
                    profile.fallback_gas_price_wei
                }
                Err(e) => {
                    warn!("{}: gas price unavailable ({e}), using fallback", bundle.chain);
                    profile.fallback_gas_price_wei
                }
            };
            let native_usd = match adapter.native_usd().await {
                Ok(usd) if usd.is_finite() && usd > 0.0 => usd,
                Ok(usd) => {
                    warn!("{}: native price {usd} is unusable, using fallback", bundle.chain);
                    profile.fallback_native_usd
                }
                Err(e) => {
                    warn!("{}: native price unavailable ({e}), using fallback", bundle.chain);
                    profile.fallback_native_usd
                }
            };
            (gas_price, native_usd)
        }
        None => (profile.fallback_gas_price_wei, profile.fallback_native_usd),
    };

    let estimate = profile.gas_usd(bundle.len(), gas_price, native_usd);
    if estimate.is_finite() {
        estimate
    } else {
        profile.gas_usd(
            bundle.len(),
            profile.fallback_gas_price_wei,
            profile.fallback_native_usd,
        )
    }
}

pub fn apply_estimate(bundle: &mut ClaimBundle, est_gas_usd: f64) {
    bundle.set_gas_estimate(est_gas_usd);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfitVerdict {
    Accepted,
    BelowGross { total_usd: f64, min: f64 },
    BelowNet { net_usd: f64, min: f64 },
}

impl fmt::Display for ProfitVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitVerdict::Accepted => write!(f, "accepted"),
            ProfitVerdict::BelowGross { total_usd, min } => {
                write!(f, "gross ${total_usd:.4} below minimum ${min:.4}")
            }
            ProfitVerdict::BelowNet { net_usd, min } => {
                write!(f, "net ${net_usd:.4} below minimum ${min:.4}")
            }
        }
    }
}

pub fn verdict(bundle: &ClaimBundle, policy: &Policy) -> ProfitVerdict {
    if bundle.total_usd < policy.min_bundle_gross_usd {
        return ProfitVerdict::BelowGross {
            total_usd: bundle.total_usd,
            min: policy.min_bundle_gross_usd,
        };
    }
    let net_usd = bundle.total_usd - bundle.est_gas_usd;
    if net_usd < policy.min_bundle_net_usd {
        return ProfitVerdict::BelowNet {
            net_usd,
            min: policy.min_bundle_net_usd,
        };
    }
    ProfitVerdict::Accepted
}

pub fn is_profitable(bundle: &ClaimBundle, policy: &Policy) -> bool {
    match verdict(bundle, policy) {
        ProfitVerdict::Accepted => true,
        rejected => {
            debug!(
                "Bundle {} ({} {} items on {}) rejected: {rejected}",
                bundle.id,
                bundle.len(),
                bundle.protocol,
                bundle.chain
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{reward, StubAdapter};
    use shared::web3::AdapterError;

    fn avalanche_bundle() -> ClaimBundle {
        let mut items = vec![
            reward("1", "avalanche", "x", "0xdest"),
            reward("2", "avalanche", "x", "0xdest"),
            reward("3", "avalanche", "x", "0xdest"),
        ];
        items[0].amount_usd = 2.0;
        items[1].amount_usd = 1.5;
        items[2].amount_usd = 1.5;
        ClaimBundle::new(items).unwrap()
    }

    #[test]
    fn test_cheap_gas_is_accepted() {
        let mut bundle = avalanche_bundle();
        apply_estimate(&mut bundle, 1.0);
        assert_eq!(bundle.net_usd, 4.0);
        assert!(is_profitable(&bundle, &Policy::for_tests()));
    }

    #[test]
    fn test_expensive_gas_is_rejected() {
        let mut bundle = avalanche_bundle();
        apply_estimate(&mut bundle, 4.5);
        assert_eq!(bundle.net_usd, 0.5);
        assert!(!is_profitable(&bundle, &Policy::for_tests()));
        assert!(matches!(
            verdict(&bundle, &Policy::for_tests()),
            ProfitVerdict::BelowNet { .. }
        ));
    }

    #[test]
    fn test_gross_floor_checked_first() {
        let bundle = ClaimBundle::new(vec![reward("1", "avalanche", "x", "0xdest")]).unwrap();
        assert!(matches!(
            verdict(&bundle, &Policy::for_tests()),
            ProfitVerdict::BelowGross { .. }
        ));
    }

    #[test]
    fn test_gas_units_scale_with_items() {
        let profile = GasProfile::for_chain(&ChainId::new("ethereum"));
        assert_eq!(profile.gas_units(1), 150_000);
        assert_eq!(profile.gas_units(3), 270_000);
        assert_eq!(profile.gas_units(0), 150_000);
    }

    #[test]
    fn test_unknown_chain_uses_default_profile() {
        let profile = GasProfile::for_chain(&ChainId::new("somechain"));
        assert_eq!(profile.base_units, 200_000);
        assert_eq!(profile.native_decimals, 18);
    }

    #[tokio::test]
    async fn test_estimate_uses_live_prices() {
        let bundle = avalanche_bundle();
        let adapter = StubAdapter::new("avalanche").with_prices(25 * GWEI, 20.0);
        let estimate = estimate_bundle_gas_usd(&bundle, Some(&adapter)).await;
        // 270k units * 25 gwei = 0.00675 AVAX at $20
        assert!((estimate - 0.135).abs() < 1e-9, "got {estimate}");
    }

    #[tokio::test]
    async fn test_estimate_falls_back_on_adapter_failure() {
        let bundle = avalanche_bundle();
        let adapter = StubAdapter::new("avalanche")
            .with_price_errors(AdapterError::Transient("rpc down".into()));
        let with_failures = estimate_bundle_gas_usd(&bundle, Some(&adapter)).await;
        let offline = estimate_bundle_gas_usd(&bundle, None).await;

        // 270k units * 30 gwei = 0.0081 AVAX at $40
        assert!((offline - 0.324).abs() < 1e-9, "got {offline}");
        assert_eq!(with_failures, offline);
    }

    #[tokio::test]
    async fn test_zero_live_prices_are_replaced() {
        let bundle = avalanche_bundle();
        let adapter = StubAdapter::new("avalanche").with_prices(0, f64::NAN);
        let estimate = estimate_bundle_gas_usd(&bundle, Some(&adapter)).await;
        assert_eq!(estimate, estimate_bundle_gas_usd(&bundle, None).await);
    }
}
