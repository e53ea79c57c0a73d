use alloy::primitives::U256;

/// Total cost in the native asset's smallest unit, computed without rounding.
pub fn gas_cost_wei(gas_units: u64, gas_price: u128) -> U256 {
    U256::from(gas_units) * U256::from(gas_price)
}

/// Converts a smallest-unit amount to a decimal amount of the native asset.
/// Whole and fractional parts are split with integer division so that large
/// values only lose precision at the final float conversion.
pub fn to_decimal(amount: U256, decimals: u8) -> f64 {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / scale;
    let fraction = amount % scale;

    let whole = u128::try_from(whole).unwrap_or(u128::MAX) as f64;
    let fraction = u128::try_from(fraction).unwrap_or(0) as f64;
    let scale = u128::try_from(scale).unwrap_or(u128::MAX) as f64;
    whole + fraction / scale
}

/// One whole native unit expressed in smallest units.
pub fn one_unit(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}
