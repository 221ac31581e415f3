// src/fixed_point.rs
use ethers::types::U256;
use ethers::utils::parse_ether;

use crate::error::PaymasterError;

/// Prices are "token units per native unit" scaled by 1e18.
pub const PRICE_SCALE: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// Markups are scaled by 1e6, so 1_100_000 is a 10% markup.
pub const PRICE_DENOMINATOR: U256 = U256([1_000_000, 0, 0, 0]);

pub(crate) fn checked_add(a: U256, b: U256, what: &'static str) -> Result<U256, PaymasterError> {
    a.checked_add(b).ok_or(PaymasterError::Overflow(what))
}

pub(crate) fn checked_mul(a: U256, b: U256, what: &'static str) -> Result<U256, PaymasterError> {
    a.checked_mul(b).ok_or(PaymasterError::Overflow(what))
}

/// Converts a decimal price (for example a USD quote from a market data
/// feed) into the 1e18 fixed-point scale.
pub fn parse_price(price: f64) -> Result<U256, PaymasterError> {
    if !price.is_finite() || price < 0.0 {
        return Err(PaymasterError::InvalidParameters(format!(
            "price must be a finite non-negative number, got {price}"
        )));
    }
    parse_ether(price.to_string())
        .map_err(|e| PaymasterError::InvalidParameters(format!("unparseable price {price}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_constants() {
        assert_eq!(PRICE_SCALE, U256::exp10(18));
        assert_eq!(PRICE_DENOMINATOR, U256::exp10(6));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(1.0).unwrap(), U256::exp10(18));
        assert_eq!(
            parse_price(1850.25).unwrap(),
            U256::from(1_850_250_000_000_000_000_000u128)
        );
        assert!(parse_price(0.0).unwrap().is_zero());
        assert!(matches!(
            parse_price(-1.0),
            Err(PaymasterError::InvalidParameters(_))
        ));
        assert!(parse_price(f64::NAN).is_err());
    }

    #[test]
    fn test_checked_ops() {
        assert_eq!(
            checked_mul(U256::from(3), U256::from(7), "product").unwrap(),
            U256::from(21)
        );
        assert_eq!(
            checked_add(U256::MAX, U256::one(), "sum"),
            Err(PaymasterError::Overflow("sum"))
        );
    }
}
