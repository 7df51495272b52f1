use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Fixed-point salary amount with exactly two fractional digits.
///
/// Bounded so it always fits `NUMERIC(18,2)`: non-negative and below 10^16.
/// Serializes as a decimal string (`"50000.00"`); deserializes from a JSON
/// number or string, digit for digit (see [`deserialize_exact`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "Decimal")]
pub struct Salary(Decimal);

impl Salary {
    /// Number of fractional digits kept.
    pub const SCALE: u32 = 2;

    const MAX_INTEGER_DIGITS: u32 = 16;

    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation("salary", "must not be negative"));
        }

        let normalized = amount.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(DomainError::validation(
                "salary",
                "must have at most 2 fractional digits",
            ));
        }

        let limit = Decimal::from(10_i64.pow(Self::MAX_INTEGER_DIGITS));
        if normalized >= limit {
            return Err(DomainError::validation("salary", "is too large"));
        }

        let mut value = normalized;
        value.rescale(Self::SCALE);
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        let mut value = Decimal::ZERO;
        value.rescale(Self::SCALE);
        Self(value)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for Salary {}

impl Default for Salary {
    fn default() -> Self {
        Self::zero()
    }
}

impl core::fmt::Display for Salary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Salary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let amount = deserialize_exact(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

/// Read a decimal from a JSON number or string without going through `f64`.
///
/// Relies on serde_json's `arbitrary_precision`, which keeps the number's
/// source text; `1234567890123456.78` stays exactly that.
pub fn deserialize_exact<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        other => return Err(D::Error::custom(format!("expected a decimal, got {other}"))),
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| D::Error::custom(format!("invalid decimal {raw:?}: {e}")))
}

impl TryFrom<Decimal> for Salary {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Salary> for Decimal {
    fn from(value: Salary) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rescales_to_two_digits() {
        assert_eq!(Salary::new(dec("50000")).unwrap().to_string(), "50000.00");
        assert_eq!(Salary::new(dec("1234.5")).unwrap().to_string(), "1234.50");
        assert_eq!(Salary::new(dec("12.340")).unwrap().to_string(), "12.34");
    }

    #[test]
    fn rejects_extra_precision_and_negative() {
        assert!(Salary::new(dec("10.005")).is_err());
        assert!(Salary::new(dec("-1")).is_err());
    }

    #[test]
    fn enforces_numeric_18_2_bound() {
        assert!(Salary::new(dec("9999999999999999.99")).is_ok());
        assert!(Salary::new(dec("10000000000000000")).is_err());
    }

    #[test]
    fn accepts_json_numbers_and_strings() {
        let from_number: Salary = serde_json::from_str("50000.00").unwrap();
        let from_string: Salary = serde_json::from_str("\"50000.00\"").unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"50000.00\"");
    }

    #[test]
    fn json_numbers_keep_every_digit() {
        let near_bound: Salary = serde_json::from_str("9999999999999999.99").unwrap();
        assert_eq!(near_bound.to_string(), "9999999999999999.99");

        let sixteen_digits: Salary = serde_json::from_str("1234567890123456.78").unwrap();
        assert_eq!(sixteen_digits.to_string(), "1234567890123456.78");

        let scientific: Salary = serde_json::from_str("5e4").unwrap();
        assert_eq!(scientific.to_string(), "50000.00");

        assert!(serde_json::from_str::<Salary>("true").is_err());
    }
}
