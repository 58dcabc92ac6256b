//! Integer AMM math.
//!
//! Every product goes through a 256-bit-plus intermediate so 18-decimal
//! reserves cannot overflow; results are floored.

use num_bigint::BigUint;

use crate::PoolError;

/// Fees are expressed in basis points of the input amount.
pub const BPS_DENOMINATOR: u128 = 10_000;
pub const DEFAULT_FEE_BPS: u16 = 30;
pub const MAX_FEE_BPS: u16 = 1_000;
/// Fixed-point scale of quoted prices (18 decimals).
pub const PRICE_PRECISION: u128 = 1_000_000_000_000_000_000;

fn narrow(value: BigUint) -> Result<u128, PoolError> {
    u128::try_from(&value).map_err(|_| PoolError::InvalidAmount("result overflows u128".into()))
}

/// `floor(a * b / d)`.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, PoolError> {
    if d == 0 {
        return Err(PoolError::InvalidReserves);
    }
    narrow(BigUint::from(a) * b / d)
}

/// Output of a constant-product swap of `amount_in` with the fee retained in
/// the input reserve:
///
/// `out = floor(in' * r_out / (r_in + in'))`, `in' = in * (1 - fee)`.
pub fn get_amount_out(
    amount_in: u128,
    reserve_in: u128,
    reserve_out: u128,
    fee_bps: u16,
) -> Result<u128, PoolError> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(PoolError::InvalidReserves);
    }
    if u128::from(fee_bps) > BPS_DENOMINATOR {
        return Err(PoolError::InvalidFee(fee_bps));
    }
    if amount_in == 0 {
        return Ok(0);
    }
    let in_with_fee = BigUint::from(amount_in) * (BPS_DENOMINATOR - u128::from(fee_bps));
    let numerator = &in_with_fee * reserve_out;
    let denominator = BigUint::from(reserve_in) * BPS_DENOMINATOR + in_with_fee;
    // Strictly below reserve_out, so it always fits.
    narrow(numerator / denominator)
}

/// Amount of B matching `amount_a` of A at the current reserve ratio.
pub fn quote(amount_a: u128, reserve_a: u128, reserve_b: u128) -> Result<u128, PoolError> {
    if amount_a == 0 {
        return Err(PoolError::InvalidAmount("quote amount must be positive".into()));
    }
    if reserve_a == 0 || reserve_b == 0 {
        return Err(PoolError::InvalidReserves);
    }
    mul_div(amount_a, reserve_b, reserve_a)
}

/// Integer square root (floor), Newton's method.
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = x / 2 + 1;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// `floor(sqrt(a * b))`; always fits since it is at most `max(a, b)`.
pub fn sqrt_product(a: u128, b: u128) -> u128 {
    let root = (BigUint::from(a) * b).sqrt();
    u128::try_from(&root).unwrap_or(u128::MAX)
}

/// Price of one whole `base` token in whole `quote` tokens, as an
/// 18-decimal fixed-point number, adjusting for each token's precision.
pub fn price(
    reserve_base: u128,
    reserve_quote: u128,
    base_decimals: u8,
    quote_decimals: u8,
) -> Result<u128, PoolError> {
    if reserve_base == 0 || reserve_quote == 0 {
        return Err(PoolError::InvalidReserves);
    }
    let ten = BigUint::from(10u8);
    let numerator =
        BigUint::from(reserve_quote) * PRICE_PRECISION * ten.pow(u32::from(base_decimals));
    let denominator = BigUint::from(reserve_base) * ten.pow(u32::from(quote_decimals));
    narrow(numerator / denominator)
}

/// `a * b` compared without overflow; used for the reserve-product check.
pub fn product_le(a: (u128, u128), b: (u128, u128)) -> bool {
    BigUint::from(a.0) * a.1 <= BigUint::from(b.0) * b.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_out_matches_worked_example() {
        // 100 in against (1000, 1000) at 0.3%: floor(99.7 * 1000 / 1099.7) = 90.
        assert_eq!(get_amount_out(100, 1000, 1000, 30).unwrap(), 90);
    }

    #[test]
    fn amount_out_edge_cases() {
        assert_eq!(get_amount_out(0, 1000, 1000, 30).unwrap(), 0);
        assert!(matches!(get_amount_out(1, 0, 1000, 30), Err(PoolError::InvalidReserves)));
        assert!(matches!(get_amount_out(1, 1000, 0, 30), Err(PoolError::InvalidReserves)));
        // Without a fee the plain constant-product formula applies.
        assert_eq!(get_amount_out(1000, 1000, 1000, 0).unwrap(), 500);
    }

    #[test]
    fn amount_out_handles_18_decimal_reserves() {
        let unit = 10u128.pow(18);
        let reserve = 50_000_000 * unit;
        let out = get_amount_out(1_000 * unit, reserve, reserve, 30).unwrap();
        assert!(out < 1_000 * unit);
        assert!(out > 990 * unit);
    }

    #[test]
    fn quote_is_proportional() {
        assert_eq!(quote(10, 100, 250).unwrap(), 25);
        assert!(matches!(quote(0, 100, 250), Err(PoolError::InvalidAmount(_))));
        assert!(matches!(quote(10, 0, 250), Err(PoolError::InvalidReserves)));
    }

    #[test]
    fn square_roots() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u128::MAX), u64::MAX as u128);
        assert_eq!(sqrt_product(1000, 1000), 1000);
        assert_eq!(sqrt_product(u128::MAX, u128::MAX), u128::MAX);
    }

    #[test]
    fn price_adjusts_for_decimals() {
        // 1000 wDOI (18 dp) against 2500 USDT (6 dp): 2.5 USDT per wDOI.
        let w = 1_000 * 10u128.pow(18);
        let s = 2_500 * 10u128.pow(6);
        assert_eq!(price(w, s, 18, 6).unwrap(), 2_500_000_000_000_000_000);
        assert!(matches!(price(0, s, 18, 6), Err(PoolError::InvalidReserves)));
    }
}
