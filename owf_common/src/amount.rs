use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// The number of minor units (e.g. cents) in one unit of currency.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------       Amount        ---------------------------------------------------------
/// A currency amount, stored as a whole number of minor units.
///
/// Orders are denominated in the exchange's local currency. The workflow never converts between currencies, so the
/// amount carries no currency code.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Amount(i64);

op!(binary Amount, Add, add);
op!(binary Amount, Sub, sub);
op!(inplace Amount, AddAssign, add_assign);
op!(inplace Amount, SubAssign, sub_assign);
op!(unary Amount, Neg, neg);

impl Mul<i64> for Amount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an amount: {0}")]
pub struct AmountConversionError(String);

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Amount {
    type Error = AmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(AmountConversionError(format!("Value {value} is too large to convert to an amount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_UNITS_PER_MAJOR.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

impl Amount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * MINOR_UNITS_PER_MAJOR)
    }

    /// The amount in whole currency units, as used by numeric workflow conditions.
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / MINOR_UNITS_PER_MAJOR as f64
    }

    /// Applies a rate given in basis points (1/100th of a percent), truncating towards zero.
    pub fn apply_rate_bps(&self, bps: i64) -> Self {
        let scaled = i128::from(self.0) * i128::from(bps) / 10_000;
        #[allow(clippy::cast_possible_truncation)]
        Self(scaled as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Amount::from(0).to_string(), "0.00");
        assert_eq!(Amount::from(5).to_string(), "0.05");
        assert_eq!(Amount::from_major(1250).to_string(), "1250.00");
        assert_eq!(Amount::from(-12_345).to_string(), "-123.45");
    }

    #[test]
    fn arithmetic() {
        let mut a = Amount::from_major(10);
        a += Amount::from(50);
        assert_eq!(a.value(), 1_050);
        a -= Amount::from_major(1);
        assert_eq!(a, Amount::from(950));
        assert_eq!(-a, Amount::from(-950));
        let total: Amount = vec![Amount::from(1), Amount::from(2), Amount::from(3)].into_iter().sum();
        assert_eq!(total, Amount::from(6));
        assert_eq!(Amount::from(7) * 3, Amount::from(21));
    }

    #[test]
    fn commission_rate() {
        let amount = Amount::from_major(1_000);
        assert_eq!(amount.apply_rate_bps(150), Amount::from_major(15));
        assert_eq!(Amount::from(99).apply_rate_bps(100), Amount::from(0));
        assert!((Amount::from(5_050).as_major() - 50.5).abs() < f64::EPSILON);
    }

    #[test]
    fn conversion() {
        assert!(Amount::try_from(u64::MAX).is_err());
        assert_eq!(Amount::try_from(42u64).unwrap(), Amount::from(42));
    }

    #[test]
    fn serde_is_transparent_number() {
        let json = serde_json::to_string(&Amount::from(1234)).unwrap();
        assert_eq!(json, "1234");
    }
}
