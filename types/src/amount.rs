//! Fixed-point amount helpers.
//!
//! Amounts are raw integers (u128) in the token's smallest unit. These
//! helpers convert between raw units and decimal strings for display and
//! CLI input; the core itself never uses floating point.

use crate::TypesError;

/// `10^decimals`, or `None` if it does not fit in a u128.
pub fn pow10(decimals: u8) -> Option<u128> {
    10u128.checked_pow(decimals as u32)
}

/// Render a raw amount as a decimal string, trimming trailing zeros.
///
/// `format_units(1_500_000, 6) == "1.5"`
pub fn format_units(raw: u128, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = raw.to_string();
    let decimals = decimals as usize;
    let (whole, frac) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole
    } else {
        format!("{}.{}", whole, frac)
    }
}

/// Parse a decimal string into raw units.
///
/// `parse_units("1.5", 6) == Ok(1_500_000)`
pub fn parse_units(input: &str, decimals: u8) -> Result<u128, TypesError> {
    let s = input.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(TypesError::InvalidAmount(input.to_string()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(TypesError::InvalidAmount(input.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(TypesError::TooManyDecimals {
            input: input.to_string(),
            decimals,
        });
    }
    let overflow = || TypesError::Overflow(input.to_string());
    let unit = pow10(decimals).ok_or_else(overflow)?;
    let whole_raw = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| overflow())?
    };
    let frac_raw = if frac.is_empty() {
        0
    } else {
        let scale = pow10(decimals - frac.len() as u8).ok_or_else(overflow)?;
        frac.parse::<u128>()
            .map_err(|_| overflow())?
            .checked_mul(scale)
            .ok_or_else(overflow)?
    };
    whole_raw
        .checked_mul(unit)
        .and_then(|w| w.checked_add(frac_raw))
        .ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_trailing_zeros_trimmed() {
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(1_000_000, 6), "1");
        assert_eq!(format_units(42, 6), "0.000042");
        assert_eq!(format_units(0, 18), "0");
        assert_eq!(format_units(7, 0), "7");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(parse_units("1.5", 6).unwrap(), 1_500_000);
        assert_eq!(parse_units("100", 6).unwrap(), 100_000_000);
        assert_eq!(parse_units(".25", 2).unwrap(), 25);
        assert_eq!(parse_units("0.000001", 6).unwrap(), 1);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_units("", 6), Err(TypesError::InvalidAmount(_))));
        assert!(matches!(parse_units("-1", 6), Err(TypesError::InvalidAmount(_))));
        assert!(matches!(parse_units("1.2.3", 6), Err(TypesError::InvalidAmount(_))));
        assert!(matches!(
            parse_units("1.0000001", 6),
            Err(TypesError::TooManyDecimals { .. })
        ));
    }
}
