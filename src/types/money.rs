use crate::types::errors::MoneyError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const DECIMAL_PLACES: usize = 2;
const SCALE: i64 = 10i64.pow(DECIMAL_PLACES as u32);

/// A currency amount held as an integer number of cents.
///
/// Every piece of ledger arithmetic goes through this type. The checked operations
/// return `MoneyError::Overflow` instead of wrapping or saturating, so a ledger
/// mutation either produces an exact result or does not happen at all.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses an amount that must be strictly greater than zero.
    pub fn parse_amount(value: &str) -> Result<Money, MoneyError> {
        let amount = Money::from_str(value)?;

        if !amount.is_positive() {
            return Err(MoneyError::InvalidAmount(format!("Amount must be greater than zero: '{}'", value.trim())));
        }

        Ok(amount)
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(rhs.0).map(Money).ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0.checked_sub(rhs.0).map(Money).ok_or(MoneyError::Overflow)
    }

    pub fn checked_neg(self) -> Result<Money, MoneyError> {
        self.0.checked_neg().map(Money).ok_or(MoneyError::Overflow)
    }
}

impl Display for Money {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u64;
        let integer = abs / scale;
        let fraction = abs % scale;
        write!(formatter, "{}{}.{:0width$}", sign, integer, fraction, width = DECIMAL_PLACES)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if value.is_empty() {
            return Err(MoneyError::InvalidAmount("Value is an empty string".to_string()));
        }

        let (is_negative, unsigned) = if let Some(rest) = value.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = value.strip_prefix('+') {
            (false, rest)
        } else {
            (false, value)
        };

        let (integer_part, fraction_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        if fraction_part.contains('.') {
            return Err(MoneyError::InvalidAmount(format!("Value has more than one decimal point: '{value}'")));
        }

        if integer_part.is_empty() || !is_digits(integer_part) {
            return Err(MoneyError::InvalidAmount(format!("Value has an invalid integer part: '{value}'")));
        }

        if fraction_part.len() > DECIMAL_PLACES {
            return Err(MoneyError::InvalidAmount(format!("Value has too many decimal places: '{value}'")));
        }

        if !is_digits(fraction_part) {
            return Err(MoneyError::InvalidAmount(format!("Value has an invalid fraction part: '{value}'")));
        }

        // Digits only at this point, so a failed parse can only mean the value is too large.
        let integer: i64 = integer_part.parse().map_err(|_| MoneyError::Overflow)?;

        let fraction: i64 = if fraction_part.is_empty() {
            0
        } else {
            format!("{:0<width$}", fraction_part, width = DECIMAL_PLACES)
                .parse()
                .map_err(|_| MoneyError::InvalidAmount(format!("Value has an invalid fraction part: '{value}'")))?
        };

        let cents = integer.checked_mul(SCALE)
            .and_then(|v| v.checked_add(fraction))
            .ok_or(MoneyError::Overflow)?;

        Ok(Money(if is_negative { -cents } else { cents }))
    }
}

fn is_digits(value: &str) -> bool {
    value.bytes().all(|byte| byte.is_ascii_digit())
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Money::from_str(&value).map_err(de::Error::custom)
    }
}
