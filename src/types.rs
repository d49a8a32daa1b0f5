//! Core value types for ledger accounting

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LedgerError;

/// Participant identity: secp256k1 public key
pub use secp256k1::PublicKey;

/// Decimal rounding context: significant digits kept after each division
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionContext {
    pub precision: u64,
}

impl PrecisionContext {
    pub fn new(precision: u64) -> Self {
        Self { precision }
    }

    pub fn round(&self, value: &BigDecimal) -> BigDecimal {
        value.with_prec(self.precision)
    }

    /// numerator / denominator, rounded; `None` when dividing by zero
    pub fn divide(&self, numerator: &BigDecimal, denominator: &BigDecimal) -> Option<BigDecimal> {
        if *denominator == BigDecimal::from(0) {
            return None;
        }
        Some(self.round(&(numerator / denominator)))
    }
}

impl Default for PrecisionContext {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_PRECISION)
    }
}

macro_rules! decimal_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(BigDecimal);

        impl $name {
            pub fn new(value: BigDecimal) -> Self {
                Self(value)
            }

            pub fn zero() -> Self {
                Self(BigDecimal::from(0))
            }

            pub fn one() -> Self {
                Self(BigDecimal::from(1))
            }

            pub fn is_zero(&self) -> bool {
                self.0 == BigDecimal::from(0)
            }

            pub fn as_decimal(&self) -> &BigDecimal {
                &self.0
            }

            pub fn into_decimal(self) -> BigDecimal {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(BigDecimal::from(value))
            }
        }

        impl From<BigDecimal> for $name {
            fn from(value: BigDecimal) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                BigDecimal::from_str(s).map(Self).map_err(|e| {
                    LedgerError::Serialization(format!(
                        "invalid {} '{}': {}",
                        stringify!($name),
                        s,
                        e
                    ))
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        // Normalized so that equal values encode to equal bytes regardless of scale
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0.normalized())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                BigDecimal::from_str(&s)
                    .map(Self)
                    .map_err(serde::de::Error::custom)
            }
        }

        impl Add for $name {
            type Output = $name;

            fn add(self, rhs: $name) -> $name {
                Self(self.0 + rhs.0)
            }
        }

        impl<'a> Add<&'a $name> for &'a $name {
            type Output = $name;

            fn add(self, rhs: &'a $name) -> $name {
                $name(&self.0 + &rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: $name) {
                self.0 = &self.0 + &rhs.0;
            }
        }

        impl<'a> AddAssign<&'a $name> for $name {
            fn add_assign(&mut self, rhs: &'a $name) {
                self.0 = &self.0 + &rhs.0;
            }
        }

        impl Sub for $name {
            type Output = $name;

            fn sub(self, rhs: $name) -> $name {
                Self(self.0 - rhs.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = $name>>(iter: I) -> $name {
                iter.fold($name::zero(), |acc, v| acc + v)
            }
        }
    };
}

decimal_type!(
    /// Incentive amount paid to a participant
    Payout
);

decimal_type!(
    /// Block difficulty
    Difficulty
);

decimal_type!(
    /// Per-reading weight applied by the reward formula
    DataConstant
);

decimal_type!(
    /// Raw sensor measurement
    Measurement
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_accumulation() {
        let mut total = Payout::zero();
        total += Payout::from(3);
        total += &Payout::from_str("0.25").unwrap();
        assert_eq!(total, Payout::from_str("3.25").unwrap());
    }

    #[test]
    fn test_payout_sum() {
        let total: Payout = vec![Payout::from(1), Payout::from(2), Payout::from(3)]
            .into_iter()
            .sum();
        assert_eq!(total, Payout::from(6));
    }

    #[test]
    fn test_equal_values_encode_equally() {
        let a = Payout::from_str("1.50").unwrap();
        let b = Payout::from_str("1.5").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn test_divide_rounds_to_precision() {
        let ctx = PrecisionContext::new(5);
        let third = ctx
            .divide(&BigDecimal::from(1), &BigDecimal::from(3))
            .unwrap();
        assert_eq!(third, BigDecimal::from_str("0.33333").unwrap());
    }

    #[test]
    fn test_divide_by_zero() {
        let ctx = PrecisionContext::default();
        assert!(ctx.divide(&BigDecimal::from(1), &BigDecimal::from(0)).is_none());
    }

    #[test]
    fn test_invalid_decimal() {
        assert!(matches!(
            Difficulty::from_str("not-a-number"),
            Err(LedgerError::Serialization(_))
        ));
    }
}
