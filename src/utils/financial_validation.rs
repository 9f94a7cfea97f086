//! Purchase amount checks and the USD -> credits / INR conversions used when creating orders.
//!
//! All arithmetic runs on `BigDecimal` parsed from the request's decimal text, so values such
//! as `9.999` are never widened through binary floating point.

use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};

use crate::config::settings::CreditsConfig;
use crate::error::AppError;

/// Parses a JSON number into an exact decimal using its textual form.
pub fn parse_usd_amount(number: &serde_json::Number) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(&number.to_string())
        .map_err(|_| AppError::Validation("Amount must be a valid number".to_string()))
}

/// Checks a purchase amount against the configured bounds.
pub fn validate_purchase_amount(amount_usd: &BigDecimal, credits: &CreditsConfig) -> Result<(), AppError> {
    if amount_usd <= &BigDecimal::from(0) {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }
    if amount_usd < &credits.min_purchase_usd {
        return Err(AppError::Validation(format!(
            "Minimum purchase is ${}",
            credits.min_purchase_usd
        )));
    }
    if amount_usd > &credits.max_purchase_usd {
        return Err(AppError::Validation(format!(
            "Maximum purchase is ${}",
            credits.max_purchase_usd
        )));
    }
    Ok(())
}

/// `floor(amount_usd * credits_per_dollar)`
pub fn calculate_credits(amount_usd: &BigDecimal, credits_per_dollar: i64) -> Result<i64, AppError> {
    let credits = (amount_usd * BigDecimal::from(credits_per_dollar))
        .with_scale_round(0, RoundingMode::Floor);

    credits
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("Amount out of range: {}", amount_usd)))
}

/// Converts USD to INR paise at a fixed rate, rounding half up to the nearest paisa.
pub fn convert_usd_to_inr_paise(amount_usd: &BigDecimal, usd_to_inr_rate: &BigDecimal) -> Result<i64, AppError> {
    let paise = (amount_usd * usd_to_inr_rate * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp);

    paise
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("Amount out of range: {}", amount_usd)))
}

pub fn paise_to_rupees(paise: i64) -> BigDecimal {
    BigDecimal::new(paise.into(), 2)
}

/// Two-decimal rendering used in gateway notes and ledger descriptions.
pub fn format_usd(amount_usd: &BigDecimal) -> String {
    amount_usd.with_scale_round(2, RoundingMode::HalfUp).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decimal(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_credits_are_floored() {
        assert_eq!(calculate_credits(&decimal("9.999"), 100).unwrap(), 999);
        assert_eq!(calculate_credits(&decimal("10"), 100).unwrap(), 1000);
        assert_eq!(calculate_credits(&decimal("1.005"), 100).unwrap(), 100);
        assert_eq!(calculate_credits(&decimal("9999"), 100).unwrap(), 999_900);
    }

    #[test]
    fn test_inr_conversion_rounds_to_nearest_paisa() {
        let rate = BigDecimal::from(83);
        assert_eq!(convert_usd_to_inr_paise(&decimal("10"), &rate).unwrap(), 83_000);
        // 9.999 * 83 = 829.917 INR
        assert_eq!(convert_usd_to_inr_paise(&decimal("9.999"), &rate).unwrap(), 82_992);
        assert_eq!(paise_to_rupees(82_992), decimal("829.92"));
    }

    #[test]
    fn test_purchase_bounds() {
        let credits = CreditsConfig::default();
        assert!(validate_purchase_amount(&decimal("1"), &credits).is_ok());
        assert!(validate_purchase_amount(&decimal("9999"), &credits).is_ok());

        match validate_purchase_amount(&decimal("0.99"), &credits) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Minimum purchase is $1"),
            other => panic!("unexpected result: {:?}", other),
        }
        match validate_purchase_amount(&decimal("9999.01"), &credits) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Maximum purchase is $9999"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(validate_purchase_amount(&decimal("-5"), &credits).is_err());
    }

    #[test]
    fn test_parse_usd_amount_keeps_decimal_text() {
        let number = serde_json::Number::from_f64(9.999).unwrap();
        assert_eq!(parse_usd_amount(&number).unwrap(), decimal("9.999"));
    }

    proptest! {
        #[test]
        fn credits_match_floor_of_cents(cents in 100i64..=999_900i64, extra_mills in 0i64..10) {
            // amount = cents/100 + extra_mills/1000, always with at most three decimals
            let amount = BigDecimal::new((cents * 10 + extra_mills).into(), 3);
            let credits = calculate_credits(&amount, 100).unwrap();
            prop_assert_eq!(credits, cents);
        }
    }
}
