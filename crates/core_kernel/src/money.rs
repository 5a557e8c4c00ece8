//! Money types denominated in minor currency units
//!
//! Every stored monetary value in the platform is an integer count of cents.
//! `Money` wraps that count and only offers checked arithmetic, so an overflow
//! beyond the signed 64-bit range surfaces as an error instead of wrapping.
//! Conversion to major units (`rust_decimal::Decimal`) exists purely for display.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use thiserror::Error;

/// ISO 4217 code of the settlement currency
pub const CURRENCY_CODE: &str = "KES";

/// Number of minor units in one major unit
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in minor units (cents)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates Money from an integer amount in minor units
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates Money from a whole number of major units
    pub fn from_major(major: i64) -> Result<Self, MoneyError> {
        major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Returns the amount in minor units
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the amount in major units, for display only
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, 2)
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

    /// Returns the absolute value
    pub fn abs(&self) -> Result<Self, MoneyError> {
        self.0.checked_abs().map(Self).ok_or(MoneyError::Overflow)
    }

    /// Checked addition
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).map(Self).ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MoneyError::Overflow)
    }

    /// Sums an iterator of amounts, failing on overflow
    pub fn checked_sum<I>(amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Allocates the money into n equal parts, handling remainders
    /// The remainder is distributed among the first allocations
    pub fn allocate(&self, n: u32) -> Result<Vec<Money>, MoneyError> {
        if n == 0 {
            return Err(MoneyError::InvalidAmount("Cannot allocate to zero parts".to_string()));
        }

        let n = i64::from(n);
        let base = self.0 / n;
        let remainder = self.0 % n;

        Ok((0..n)
            .map(|i| if i < remainder.abs() { Money(base + remainder.signum()) } else { Money(base) })
            .collect())
    }

    /// Allocates money by basis-point shares
    ///
    /// Each share is floored; the leftover cents go to the parts with the
    /// largest fractional remainders (earliest part wins ties), so the
    /// allocations always sum to the original amount.
    pub fn allocate_by_bps(&self, shares: &[u32]) -> Result<Vec<Money>, MoneyError> {
        if shares.is_empty() {
            return Err(MoneyError::InvalidAmount("Empty shares".to_string()));
        }
        if self.0 < 0 {
            return Err(MoneyError::InvalidAmount("Cannot allocate a negative amount".to_string()));
        }

        let total: i128 = shares.iter().map(|s| i128::from(*s)).sum();
        if total == 0 {
            return Err(MoneyError::InvalidAmount("Total share is zero".to_string()));
        }

        let amount = i128::from(self.0);
        let mut parts: Vec<i128> = Vec::with_capacity(shares.len());
        let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(shares.len());

        for (i, share) in shares.iter().enumerate() {
            let numerator = amount * i128::from(*share);
            parts.push(numerator / total);
            remainders.push((i, numerator % total));
        }

        let mut leftover = amount - parts.iter().sum::<i128>();
        remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (i, _) in remainders {
            if leftover == 0 {
                break;
            }
            parts[i] += 1;
            leftover -= 1;
        }

        parts
            .into_iter()
            .map(|p| i64::try_from(p).map(Money).map_err(|_| MoneyError::Overflow))
            .collect()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", CURRENCY_CODE, self.to_major())
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl From<Money> for i64 {
    fn from(m: Money) -> i64 {
        m.0
    }
}

/// An amount exposed to reporting collaborators in both representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Minor units (cents)
    pub minor: i64,
    /// Major units (minor / 100)
    pub major: Decimal,
}

impl From<Money> for Amount {
    fn from(m: Money) -> Self {
        Self {
            minor: m.cents(),
            major: m.to_major(),
        }
    }
}
