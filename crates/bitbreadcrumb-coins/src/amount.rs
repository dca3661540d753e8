//! Monetary constants and fee rates.

use std::fmt;

/// Amount in silvios, the smallest unit.
pub type CAmount = i64;

/// Silvios per DUK.
pub const COIN: CAmount = 100_000_000;

pub const CENT: CAmount = 1_000_000;

/// No amount larger than this is valid.
pub const MAX_MONEY: CAmount = 45_600_000 * COIN;

/// Returns `true` if `value` is a valid amount.
pub fn money_range(value: CAmount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Fee rate in silvios per 1000 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeeRate(CAmount);

impl FeeRate {
    pub const fn new(silvios_per_k: CAmount) -> Self {
        Self(silvios_per_k)
    }

    /// Rate of a transaction of `size` bytes paying `fee_paid`.
    pub fn from_fee_paid(fee_paid: CAmount, size: usize) -> Self {
        if size > 0 {
            Self(fee_paid * 1000 / size as CAmount)
        } else {
            Self(0)
        }
    }

    /// Fee for `size` bytes, rounded up to the next kilobyte.
    ///
    /// A positive rate never results in a zero fee.
    pub fn fee(&self, size: usize) -> CAmount {
        let size = size.div_ceil(1000) * 1000;
        let fee = self.0 * size as CAmount / 1000;
        if fee == 0 && self.0 > 0 { self.0 } else { fee }
    }

    pub fn fee_per_k(&self) -> CAmount {
        self.fee(1000)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08} DUK/kB", self.0 / COIN, self.0 % COIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_range() {
        assert!(money_range(0));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(MAX_MONEY + 1));
        assert!(!money_range(-1));
    }

    #[test]
    fn test_fee_rate() {
        let rate = FeeRate::new(1000);
        assert_eq!(rate.fee(0), 1000);
        assert_eq!(rate.fee(1), 1000);
        assert_eq!(rate.fee(999), 1000);
        assert_eq!(rate.fee(1000), 1000);
        assert_eq!(rate.fee(1001), 2000);
        assert_eq!(rate.fee_per_k(), 1000);

        assert_eq!(FeeRate::default().fee(5000), 0);
        assert_eq!(FeeRate::new(1).fee(100), 1);

        assert_eq!(FeeRate::from_fee_paid(500, 250), FeeRate::new(2000));
        assert_eq!(FeeRate::from_fee_paid(500, 0), FeeRate::new(0));
        assert!(FeeRate::new(10) < FeeRate::new(11));
    }

    #[test]
    fn test_fee_rate_display() {
        assert_eq!(FeeRate::new(COIN + 5).to_string(), "1.00000005 DUK/kB");
        assert_eq!(FeeRate::new(CENT).to_string(), "0.01000000 DUK/kB");
    }
}
