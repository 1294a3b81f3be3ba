//! # Money Module
//!
//! Provides the `Money` type for balances, charges, prices and ledger amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount in the system is stored in paisa (1/100 of a taka).      │
//! │                                                                         │
//! │  Wallet balance   12.50 ──► Money(1250)                                │
//! │  SMS charge        0.35 ──► Money(35)                                  │
//! │  Invoice total  1999.99 ──► Money(199999)                              │
//! │                                                                         │
//! │  0.35 × 3 parts = 1.05 exactly, never 1.0499999                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bazaar_core::money::Money;
//!
//! let charge = Money::parse("0.35").unwrap();
//! let cost = charge.checked_times(3).unwrap();
//! assert_eq!(cost.minor(), 105);
//! assert_eq!(cost.to_string(), "1.05");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::error::ValidationError;

/// Basis points in 100%.
pub const FULL_BPS: i64 = 10_000;

/// A monetary value in minor units (paisa).
///
/// Signed so that journal differences (debit − credit) and refunds can be
/// represented directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a value from whole major units.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Returns the raw minor-unit value.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Parses a decimal string with at most two fractional digits.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::Money;
    ///
    /// assert_eq!(Money::parse("12.5").unwrap().minor(), 1250);
    /// assert_eq!(Money::parse("-0.05").unwrap().minor(), -5);
    /// assert!(Money::parse("1.234").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Money, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = input.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty amount"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("must be a decimal number"));
        }
        if frac.len() > 2 {
            return Err(invalid("at most two decimal places"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("amount too large"))?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => frac.parse().map_err(|_| invalid("bad fraction"))?,
        };

        let minor = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(if negative { -minor } else { minor }))
    }

    /// Returns `bps / 10000` of this amount, rounded half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::Money;
    ///
    /// // 12.5% of 10.00
    /// assert_eq!(Money::from_minor(1000).percent_of(1250).minor(), 125);
    /// ```
    pub fn percent_of(&self, bps: i64) -> Money {
        // i128 keeps large invoice totals from overflowing
        let product = self.0 as i128 * bps as i128;
        let half = FULL_BPS as i128 / 2;
        let rounded = if product >= 0 {
            (product + half) / FULL_BPS as i128
        } else {
            (product - half) / FULL_BPS as i128
        };
        Money(rounded as i64)
    }

    /// Multiplies by a count (message parts, item quantity), `None` on
    /// overflow.
    #[inline]
    pub const fn checked_times(&self, count: i64) -> Option<Money> {
        match self.0.checked_mul(count) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn saturating_times(&self, count: i64) -> Money {
        Money(self.0.saturating_mul(count))
    }

    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    #[inline]
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    #[inline]
    pub fn saturating_add(&self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Returns the larger of `self` and zero.
    #[inline]
    pub fn clamp_non_negative(&self) -> Money {
        Money(self.0.max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(500).to_string(), "5.00");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Money::parse("10").unwrap(), Money::from_major(10));
        assert_eq!(Money::parse("0.35").unwrap().minor(), 35);
        assert_eq!(Money::parse(".5").unwrap().minor(), 50);
        assert_eq!(Money::parse(" 7.25 ").unwrap().minor(), 725);
        assert!(Money::parse("").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("1.005").is_err());
        assert!(Money::parse("1.2.3").is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(250);

        assert_eq!((a + b).minor(), 1250);
        assert_eq!((a - b).minor(), 750);
        assert_eq!(a.checked_times(3), Some(Money::from_minor(3000)));
        assert_eq!((-a).minor(), -1000);
        assert_eq!(b.checked_times(4), Some(a));

        let total: Money = vec![a, b, b].iter().sum();
        assert_eq!(total.minor(), 1500);
    }

    #[test]
    fn test_overflow_is_detected() {
        let big = Money::from_minor(i64::MAX / 10);
        assert_eq!(big.checked_times(11), None);
        assert_eq!(big.checked_add(Money::from_minor(i64::MAX)), None);
        assert_eq!(big.saturating_times(11).minor(), i64::MAX);
        assert_eq!(Money::from_minor(-5).saturating_times(i64::MAX).minor(), i64::MIN);
    }

    #[test]
    fn test_percent_of_rounds_half_away_from_zero() {
        // 10.00 × 8.25% = 0.825 → 0.83
        assert_eq!(Money::from_minor(1000).percent_of(825).minor(), 83);
        assert_eq!(Money::from_minor(-1000).percent_of(825).minor(), -83);
        assert_eq!(Money::from_minor(1000).percent_of(0).minor(), 0);
        assert_eq!(Money::from_minor(1000).percent_of(FULL_BPS).minor(), 1000);
    }

    #[test]
    fn test_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_minor(1).is_positive());
        assert!(Money::from_minor(-1).is_negative());
        assert_eq!(Money::from_minor(-40).clamp_non_negative(), Money::zero());
        assert_eq!(Money::from_minor(-40).abs().minor(), 40);
    }
}
