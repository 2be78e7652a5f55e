//! Fixed-point money amounts.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Money amount stored in minor currency units (paise, cents) to avoid
/// floating point issues. Two decimal places are assumed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// Error returned when a decimal string cannot be parsed into [`Money`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid money amount '{input}': {reason}")]
pub struct ParseMoneyError {
    input: String,
    reason: &'static str,
}

impl Money {
    /// Number of minor units in one major unit.
    pub const MINOR_PER_MAJOR: i64 = 100;

    /// Creates a new Money amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates a new Money amount from a whole number of major units.
    pub fn from_major(major: i64) -> Self {
        Self(major * Self::MINOR_PER_MAJOR)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion.
    pub fn major_part(&self) -> i64 {
        self.0 / Self::MINOR_PER_MAJOR
    }

    /// Returns the minor-unit remainder after the major portion.
    pub fn minor_part(&self) -> i64 {
        self.0.abs() % Self::MINOR_PER_MAJOR
    }

    /// Returns the amount as a major-unit float, for wire formats that
    /// require a JSON number. Never use the result for arithmetic.
    pub fn to_major_f64(&self) -> f64 {
        self.0 as f64 / Self::MINOR_PER_MAJOR as f64
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds another amount, returning `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}.{:02}", self.major_part().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major_part(), self.minor_part())
        }
    }
}

impl FromStr for Money {
    type Err = ParseMoneyError;

    /// Parses `"10"`, `"10.5"` or `"10.50"`. More than two decimal places is
    /// rejected rather than rounded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseMoneyError {
            input: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(err("expected digits before the decimal point"));
        }
        if minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(err("at most two decimal digits are allowed"));
        }

        let major: i64 = major.parse().map_err(|_| err("amount out of range"))?;
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| err("amount out of range"))? * 10,
            _ => minor.parse().map_err(|_| err("amount out of range"))?,
        };

        let total = major
            .checked_mul(Self::MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(minor))
            .ok_or_else(|| err("amount out of range"))?;

        Ok(Money(if negative { -total } else { total }))
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_minor() {
        let money = Money::from_minor(1234);
        assert_eq!(money.minor_units(), 1234);
        assert_eq!(money.major_part(), 12);
        assert_eq!(money.minor_part(), 34);
    }

    #[test]
    fn test_money_from_major() {
        let money = Money::from_major(50);
        assert_eq!(money.minor_units(), 5000);
        assert_eq!(money.minor_part(), 0);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
        assert_eq!(Money::from_minor(100).to_string(), "1.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_parse() {
        assert_eq!("10".parse::<Money>().unwrap(), Money::from_minor(1000));
        assert_eq!("10.5".parse::<Money>().unwrap(), Money::from_minor(1050));
        assert_eq!("10.05".parse::<Money>().unwrap(), Money::from_minor(1005));
        assert_eq!("-0.99".parse::<Money>().unwrap(), Money::from_minor(-99));
    }

    #[test]
    fn test_money_parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
        assert!("99999999999999999999".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_checked_arithmetic() {
        let price = Money::from_minor(1000);
        assert_eq!(price.checked_mul(3), Some(Money::from_minor(3000)));
        assert_eq!(Money::from_minor(i64::MAX).checked_mul(2), None);
        assert_eq!(Money::from_minor(i64::MAX).checked_add(price), None);
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [100, 250, 650].into_iter().map(Money::from_minor).sum();
        assert_eq!(total, Money::from_minor(1000));
    }

    #[test]
    fn test_money_to_major_f64() {
        assert_eq!(Money::from_minor(2050).to_major_f64(), 20.5);
    }

    #[test]
    fn test_money_serializes_as_minor_units() {
        let json = serde_json::to_string(&Money::from_minor(2000)).unwrap();
        assert_eq!(json, "2000");
    }
}
