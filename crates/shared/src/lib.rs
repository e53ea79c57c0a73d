pub mod models;
pub mod pricing;
pub mod utils;
pub mod web3;
