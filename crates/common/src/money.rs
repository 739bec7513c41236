//! Money amounts.

use serde::{Deserialize, Serialize};

/// Money amount in integer minor units of the store currency.
///
/// Serialized as a bare integer so request and response bodies carry plain
/// numbers (`"totalPrice": 150000`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    pub fn from_minor(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_mul(self, quantity: i32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_mul_multiplies_by_quantity() {
        assert_eq!(
            Money::from_minor(50_000).checked_mul(3),
            Some(Money::from_minor(150_000))
        );
        assert_eq!(Money::from_minor(i64::MAX).checked_mul(2), None);
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [10, 20, 30].into_iter().map(Money::from_minor).sum();
        assert_eq!(total, Money::from_minor(60));
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&Money::from_minor(150_000)).unwrap();
        assert_eq!(json, "150000");
        let back: Money = serde_json::from_str("149000").unwrap();
        assert_eq!(back.minor(), 149_000);
    }
}
