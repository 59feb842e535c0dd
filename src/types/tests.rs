use super::{AccountId, Money, MoneyError};
use anyhow::Result;
use std::str::FromStr;

#[test]
fn test_money_successfully_parses_valid_strings() -> Result<()> {
    let test_cases = vec![
        ("1.0", "1.00"),
        ("1.23", "1.23"),
        ("0.01", "0.01"),
        ("-1.5", "-1.50"),
        ("  1.0  ", "1.00"),
        ("-0.01", "-0.01"),
        ("+1.0", "1.00"),
        ("100", "100.00"),
        ("1.", "1.00"),
    ];

    for (input_string, expected_output) in test_cases {
        assert_eq!(Money::from_str(input_string)?.to_string(), expected_output);
    }

    Ok(())
}

#[test]
fn test_money_fails_to_parse_invalid_strings() {
    assert!(matches!(Money::from_str("1.123"), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::from_str("abc"), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::from_str("1.2.3"), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::from_str(""), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::from_str(".5"), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::from_str("1.+5"), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::from_str("1e3"), Err(MoneyError::InvalidAmount(_))));
}

#[test]
fn test_parse_amount_requires_a_positive_value() -> Result<()> {
    assert_eq!(Money::parse_amount("30.00")?, Money::from_cents(3000));
    assert!(matches!(Money::parse_amount("0"), Err(MoneyError::InvalidAmount(_))));
    assert!(matches!(Money::parse_amount("-5.00"), Err(MoneyError::InvalidAmount(_))));

    Ok(())
}

#[test]
fn test_money_supports_checked_addition_and_subtraction() -> Result<()> {
    let value = Money::from_str("1.5")?.checked_add(Money::from_str("2.5")?)?;

    assert_eq!(value.to_string(), "4.00");

    let value = value.checked_sub(Money::from_str("5.0")?)?;

    assert_eq!(value.to_string(), "-1.00");
    assert!(value.is_negative());

    Ok(())
}

#[test]
fn test_money_reports_overflow_instead_of_wrapping() -> Result<()> {
    let largest = Money::from_cents(i64::MAX);

    assert_eq!(largest.checked_add(Money::from_cents(1)), Err(MoneyError::Overflow));
    assert_eq!(Money::from_cents(i64::MIN).checked_neg(), Err(MoneyError::Overflow));
    assert_eq!(Money::from_str("99999999999999999999"), Err(MoneyError::Overflow));
    assert_eq!(Money::from_str("92233720368547758.08"), Err(MoneyError::Overflow));

    Ok(())
}

#[test]
fn test_money_displays_extreme_values() {
    assert_eq!(Money::from_cents(i64::MIN).to_string(), "-92233720368547758.08");
    assert_eq!(Money::ZERO.to_string(), "0.00");
}

#[test]
fn test_money_serializes_as_a_fixed_decimal_string() -> Result<()> {
    let json = serde_json::to_string(&Money::from_cents(7000))?;

    assert_eq!(json, "\"70.00\"");
    assert_eq!(serde_json::from_str::<Money>(&json)?, Money::from_cents(7000));
    assert!(serde_json::from_str::<Money>("\"70.001\"").is_err());

    Ok(())
}

#[test]
fn test_account_ids_are_ordered_by_creation() -> Result<()> {
    let first = AccountId::new();
    let second = AccountId::new();

    assert!(first < second);
    assert_eq!(AccountId::from_str(&first.to_string())?, first);

    Ok(())
}
