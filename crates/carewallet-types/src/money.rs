//! Money in integer minor units
//!
//! CareWallet never touches floating point for balances or approvals. Every
//! amount is an `i64` count of minor units (paise, cents) and arithmetic is
//! checked. Percentages are `Decimal` parameters applied with an explicit
//! rounding rule.

use crate::{BenefitError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor units per major unit, used only for display.
pub const MINOR_PER_MAJOR: i64 = 100;

/// An amount of money in minor units.
///
/// Serializes as a bare integer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// How a percentage of an amount is rounded to a whole minor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round half away from zero
    HalfUp,
    /// Truncate towards zero
    Down,
}

impl Money {
    /// Zero
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from minor units
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Create from whole major units (e.g. rupees)
    pub fn from_major(major: i64) -> Result<Self> {
        major
            .checked_mul(MINOR_PER_MAJOR)
            .map(Self)
            .ok_or(BenefitError::AmountOverflow)
    }

    /// Raw minor units
    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(BenefitError::AmountOverflow)
    }

    /// Checked subtraction; the result may be negative
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(BenefitError::AmountOverflow)
    }

    /// Subtraction floored at zero
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0).max(0))
    }

    /// `percent` percent of this amount (e.g. `dec!(10)` for 10%)
    pub fn percent(self, percent: Decimal, rounding: Rounding) -> Result<Self> {
        let strategy = match rounding {
            Rounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Rounding::Down => RoundingStrategy::ToZero,
        };
        let scaled = Decimal::from(self.0)
            .checked_mul(percent)
            .ok_or(BenefitError::AmountOverflow)?
            / Decimal::ONE_HUNDRED;
        scaled
            .round_dp_with_strategy(0, strategy)
            .to_i64()
            .map(Self)
            .ok_or(BenefitError::AmountOverflow)
    }

    /// Sum of an iterator of amounts
    pub fn sum<I: IntoIterator<Item = Money>>(iter: I) -> Result<Self> {
        iter.into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::from_minor(5000);
        let b = Money::from_minor(2000);
        assert_eq!(a.checked_sub(b).unwrap(), Money::from_minor(3000));
        assert_eq!(a.checked_add(b).unwrap(), Money::from_minor(7000));
        assert!(matches!(
            Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)),
            Err(BenefitError::AmountOverflow)
        ));
    }

    #[test]
    fn test_from_major_scales_to_minor_units() {
        assert_eq!(Money::from_major(2000).unwrap(), Money::from_minor(200_000));
        assert!(matches!(Money::from_major(i64::MAX), Err(BenefitError::AmountOverflow)));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let a = Money::from_minor(100);
        assert_eq!(a.saturating_sub(Money::from_minor(250)), Money::zero());
    }

    #[test]
    fn test_percent_rounding() {
        let bill = Money::from_minor(5000);
        assert_eq!(bill.percent(dec!(10), Rounding::HalfUp).unwrap(), Money::from_minor(500));

        let odd = Money::from_minor(1005);
        // 10% of 1005 = 100.5
        assert_eq!(odd.percent(dec!(10), Rounding::HalfUp).unwrap(), Money::from_minor(101));
        assert_eq!(odd.percent(dec!(10), Rounding::Down).unwrap(), Money::from_minor(100));
    }

    #[test]
    fn test_display_and_json_shape() {
        assert_eq!(Money::from_minor(123456).to_string(), "1234.56");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(serde_json::to_string(&Money::from_minor(2000)).unwrap(), "2000");
    }
}
