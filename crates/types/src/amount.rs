//! Monetary amount with supply-bounded checked arithmetic.

use crate::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Total number of indivisible units that can ever exist.
///
/// Any arithmetic result above this is an overflow even when it still fits
/// in a `u64`.
pub const MAXIMUM_SUPPLY: Amount = Amount(9_000_000_000_000_000_000);

/// Minimum fee per operation.
pub const BASE_FEE: Amount = Amount(10_000);

/// An amount of indivisible currency units.
///
/// Arithmetic is checked against [`MAXIMUM_SUPPLY`] and zero. The `must_*`
/// variants panic and are reserved for paths where a prior well-formedness
/// check already rules the failure out.
///
/// Serializes as a decimal string so the full `u64` range survives JSON
/// round trips through consumers with 53-bit numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(units: u64) -> Self {
        Amount(units)
    }

    pub const fn as_units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition, failing once the result exceeds the maximum supply.
    pub fn add(self, other: Amount) -> Result<Amount, Error> {
        match self.0.checked_add(other.0) {
            Some(v) if v <= MAXIMUM_SUPPLY.0 => Ok(Amount(v)),
            _ => Err(Error::MaximumBalanceReached),
        }
    }

    /// Checked subtraction, failing when the result would drop below zero.
    pub fn sub(self, other: Amount) -> Result<Amount, Error> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(Error::AccountBalanceUnderZero)
    }

    /// Checked multiplication by a count, bounded by the maximum supply.
    pub fn mult(self, count: usize) -> Result<Amount, Error> {
        let count = u64::try_from(count).map_err(|_| Error::MaximumBalanceReached)?;
        match self.0.checked_mul(count) {
            Some(v) if v <= MAXIMUM_SUPPLY.0 => Ok(Amount(v)),
            _ => Err(Error::MaximumBalanceReached),
        }
    }

    /// Addition that panics on overflow.
    ///
    /// Only call this after well-formedness has bounded the operands.
    pub fn must_add(self, other: Amount) -> Amount {
        self.add(other).expect("amount addition overflowed")
    }

    /// Multiplication that panics on overflow.
    ///
    /// Only call this after well-formedness has bounded the operands.
    pub fn must_mult(self, count: usize) -> Amount {
        self.mult(count).expect("amount multiplication overflowed")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Amount).map_err(|_| Error::InvalidFee)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Amount(units)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc.must_add(a))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>()
            .map(Amount)
            .map_err(|_| serde::de::Error::custom("amount must be a decimal string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_within_supply() {
        assert_eq!(
            Amount::new(100).add(Amount::new(23)).unwrap(),
            Amount::new(123)
        );
    }

    #[test]
    fn add_past_maximum_supply_fails() {
        assert_eq!(
            MAXIMUM_SUPPLY.add(Amount::new(1)),
            Err(Error::MaximumBalanceReached)
        );
        // u64 overflow is the same error, not a wrap
        assert_eq!(
            Amount::new(u64::MAX).add(Amount::new(1)),
            Err(Error::MaximumBalanceReached)
        );
    }

    #[test]
    fn sub_below_zero_fails() {
        assert_eq!(
            Amount::new(1).sub(Amount::new(2)),
            Err(Error::AccountBalanceUnderZero)
        );
        assert_eq!(Amount::new(2).sub(Amount::new(2)).unwrap(), Amount::ZERO);
    }

    #[test]
    fn mult_is_bounded() {
        assert_eq!(Amount::new(10).mult(3).unwrap(), Amount::new(30));
        assert_eq!(MAXIMUM_SUPPLY.mult(2), Err(Error::MaximumBalanceReached));
    }

    #[test]
    #[should_panic(expected = "amount addition overflowed")]
    fn must_add_panics_on_overflow() {
        let _ = MAXIMUM_SUPPLY.must_add(Amount::new(1));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Amount::new(10_000)).unwrap();
        assert_eq!(json, "\"10000\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount::new(10_000));
    }
}
