pub mod http;
pub mod traits;

pub use http::{HttpPriceOracle, HttpRewardSource};
pub use traits::RewardSource;
