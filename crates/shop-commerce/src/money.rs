//! Money type for representing monetary values.
//!
//! Amounts are integers in the currency's smallest display unit (whole dong
//! for VND, cents for USD), so sums and quantity products are exact. Only
//! percentage arithmetic goes through floating point, and its result is
//! rounded back to the smallest unit immediately.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CommerceError;

/// Supported currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    VND,
    USD,
    EUR,
    JPY,
}

impl Currency {
    /// Get the currency code (e.g., "VND").
    pub fn code(&self) -> &'static str {
        match self {
            Currency::VND => "VND",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::JPY => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A monetary value with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Money {
    /// Amount in the smallest display unit.
    pub amount: i64,
    /// The currency.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money value from smallest units.
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Check if this is negative.
    pub fn is_negative(&self) -> bool {
        self.amount < 0
    }

    fn same_currency(&self, other: &Money) -> Result<(), CommerceError> {
        if self.currency != other.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                got: other.currency.code().to_string(),
            });
        }
        Ok(())
    }

    /// Add another Money value.
    pub fn checked_add(&self, other: &Money) -> Result<Money, CommerceError> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtract another Money value.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, CommerceError> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Multiply by a quantity.
    pub fn checked_mul(&self, factor: i64) -> Result<Money, CommerceError> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Multiply by a decimal factor, rounding to the smallest unit.
    pub fn multiply_decimal(&self, factor: f64) -> Money {
        let new_amount = (self.amount as f64 * factor).round() as i64;
        Money::new(new_amount, self.currency)
    }

    /// Calculate a percentage of this amount.
    pub fn percentage(&self, percent: f64) -> Money {
        self.multiply_decimal(percent / 100.0)
    }

    /// The smaller of two amounts in the same currency.
    pub fn min(&self, other: &Money) -> Result<Money, CommerceError> {
        self.same_currency(other)?;
        Ok(if other.amount < self.amount { *other } else { *self })
    }

    /// Sum an iterator of Money values.
    pub fn sum<'a>(
        mut iter: impl Iterator<Item = &'a Money>,
        currency: Currency,
    ) -> Result<Money, CommerceError> {
        iter.try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vnd(amount: i64) -> Money {
        Money::new(amount, Currency::VND)
    }

    #[test]
    fn test_money_display() {
        assert_eq!(vnd(200_000).to_string(), "200000 VND");
    }

    #[test]
    fn test_money_sum() {
        let lines = [vnd(100_000), vnd(50_000), vnd(5_000)];
        assert_eq!(Money::sum(lines.iter(), Currency::VND).unwrap(), vnd(155_000));
        assert_eq!(Money::sum(std::iter::empty(), Currency::VND).unwrap(), vnd(0));

        let mixed = [vnd(1), Money::new(1, Currency::USD)];
        assert!(Money::sum(mixed.iter(), Currency::VND).is_err());
    }

    #[test]
    fn test_money_addition_and_subtraction() {
        let total = vnd(200_000).checked_sub(&vnd(15_000)).unwrap();
        assert_eq!(total, vnd(185_000));
        assert_eq!(vnd(1).checked_add(&vnd(2)).unwrap(), vnd(3));
    }

    #[test]
    fn test_money_multiply() {
        assert_eq!(vnd(100_000).checked_mul(2).unwrap(), vnd(200_000));
        assert!(matches!(
            vnd(i64::MAX).checked_mul(2),
            Err(CommerceError::Overflow)
        ));
    }

    #[test]
    fn test_money_percentage_rounds_to_unit() {
        assert_eq!(vnd(200_000).percentage(10.0), vnd(20_000));
        assert_eq!(vnd(99_999).percentage(15.0), vnd(15_000));
    }

    #[test]
    fn test_money_min() {
        assert_eq!(vnd(15_000).min(&vnd(20_000)).unwrap(), vnd(15_000));
    }

    #[test]
    fn test_money_currency_mismatch() {
        let err = vnd(1000).checked_add(&Money::new(1000, Currency::USD)).unwrap_err();
        assert!(matches!(err, CommerceError::CurrencyMismatch { .. }));
    }
}
