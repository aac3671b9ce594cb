use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
    str::FromStr,
};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const BRL_CURRENCY_CODE: &str = "BRL";

//--------------------------------------       Price         ---------------------------------------------------------

/// A monetary amount in integer centavos. Amounts are only ever converted to and from decimal
/// reais at the edges, so sums and comparisons inside the engine cannot drift. Serde is one of
/// those edges: the payment provider's API deals in decimal reais, so `Price` crosses the wire
/// as `29.9`, never as `2990`.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Price(i64);

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Self::try_from_reais(amount).map_err(D::Error::custom)
    }
}

op!(binary Price, Add, add);
op!(binary Price, Sub, sub);
op!(inplace Price, SubAssign, sub_assign);

impl Mul<i64> for Price {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a price in centavos: {0}")]
pub struct PriceConversionError(String);

impl From<i64> for Price {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Price {}

/// Parses a decimal amount in reais, e.g. `"29.90"`, rounding to the nearest centavo.
impl FromStr for Price {
    type Err = PriceConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = s
            .trim()
            .parse::<f64>()
            .map_err(|e| PriceConversionError(format!("'{s}' is not a decimal amount: {e}")))?;
        Self::try_from_reais(amount)
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();
        write!(f, "{sign}R${}.{:02}", cents / 100, cents % 100)
    }
}

impl Price {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn try_from_reais(amount: f64) -> Result<Self, PriceConversionError> {
        if !amount.is_finite() || amount < 0.0 || amount > i64::MAX as f64 / 100.0 {
            return Err(PriceConversionError(format!("{amount} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self((amount * 100.0).round() as i64))
    }
}
