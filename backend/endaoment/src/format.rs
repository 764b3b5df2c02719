//! Stablecoin amount formatting, yield projections and voting power.
//!
//! Amounts are `u128` base units with [`USDC_DECIMALS`] decimals. Display
//! strings always carry two decimals.

use serde::Serialize;

use crate::errors::ValidationError;

pub const USDC_DECIMALS: u32 = endaoment_sim::USDC_DECIMALS;

/// One whole stablecoin in base units.
pub const USDC_UNIT: u128 = 10u128.pow(USDC_DECIMALS);

/// Fixed APY, 10% annual.
pub const FIXED_APY: f64 = 0.1;

/// Smallest accepted donation: 10 USDC.
pub const MIN_DONATION: u128 = 10 * USDC_UNIT;

/// Base units per displayed cent.
const UNITS_PER_CENT: u128 = USDC_UNIT / 100;

// ─────────────────────────────────────────────────────────
// Amounts
// ─────────────────────────────────────────────────────────

/// Parse a decimal string such as `"1000.50"` into base units. Digits past
/// the sixth decimal are rounded half-up.
pub fn parse_usdc(amount: &str) -> Result<u128, ValidationError> {
    let invalid = || ValidationError::InvalidAmount(amount.to_string());
    let trimmed = amount.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let decimals = USDC_DECIMALS as usize;
    let mut digits: Vec<u8> = fraction.bytes().map(|b| b - b'0').collect();
    let round_up = digits.get(decimals).is_some_and(|d| *d >= 5);
    digits.resize(decimals, 0);

    let fraction = digits.iter().fold(0u128, |acc, d| acc * 10 + u128::from(*d));
    whole
        .checked_mul(USDC_UNIT)
        .and_then(|v| v.checked_add(fraction))
        .and_then(|v| v.checked_add(u128::from(round_up)))
        .ok_or_else(invalid)
}

/// Two-decimal display, cents rounded half-up: `1_000_500_000` → `"1000.50"`.
pub fn format_usdc(amount: u128) -> String {
    let cents = amount / UNITS_PER_CENT + u128::from(amount % UNITS_PER_CENT >= UNITS_PER_CENT / 2);
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// [`format_usdc`] with thousands separators: `"1,000.50"`.
pub fn format_usdc_with_commas(amount: u128) -> String {
    let plain = format_usdc(amount);
    let (whole, cents) = plain.split_once('.').unwrap_or((&plain, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{grouped}.{cents}")
}

/// Base units as whole stablecoins, for projections and display arithmetic.
pub fn usdc_to_f64(amount: u128) -> f64 {
    amount as f64 / USDC_UNIT as f64
}

// ─────────────────────────────────────────────────────────
// Yield
// ─────────────────────────────────────────────────────────

/// Simple interest: `principal × apy × days / 365`.
pub fn calculate_yield(principal: f64, days: u32, apy: f64) -> f64 {
    principal * apy * (f64::from(days) / 365.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub period: &'static str,
    pub days: u32,
    #[serde(rename = "yield")]
    pub yield_amount: f64,
    pub total: f64,
}

const HORIZONS: [(&str, u32); 5] = [
    ("Daily", 1),
    ("Weekly", 7),
    ("Monthly", 30),
    ("Quarterly", 90),
    ("Yearly", 365),
];

pub fn calculate_projections(principal: f64, apy: f64) -> Vec<Projection> {
    HORIZONS
        .iter()
        .map(|&(period, days)| {
            let yield_amount = calculate_yield(principal, days, apy);
            Projection {
                period,
                days,
                yield_amount,
                total: principal + yield_amount,
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Voting power and validation
// ─────────────────────────────────────────────────────────

/// `min(1 + 0.1 × (academic + sports + student), 4)` in whole votes.
pub fn voting_power(academic: u32, sports: u32, student: u32) -> f64 {
    f64::from(endaoment_sim::voting_power_tenths(academic, sports, student)) / 10.0
}

/// Off-chain donation checks, in order: positive, covered by the balance,
/// at least [`MIN_DONATION`].
pub fn validate_donation(amount: u128, balance: u128) -> Result<(), ValidationError> {
    if amount == 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    if amount > balance {
        return Err(ValidationError::InsufficientBalance);
    }
    if amount < MIN_DONATION {
        return Err(ValidationError::BelowMinimum);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(parse_usdc("1000.50").unwrap(), 1_000_500_000);
        assert_eq!(parse_usdc("10").unwrap(), 10_000_000);
        assert_eq!(parse_usdc(".5").unwrap(), 500_000);
        assert_eq!(parse_usdc(" 7. ").unwrap(), 7_000_000);
        assert_eq!(parse_usdc("0.0000015").unwrap(), 2);
        assert_eq!(parse_usdc("0.0000014").unwrap(), 1);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", ".", "-1", "1.2.3", "abc", "1e6", "1,000"] {
            assert_eq!(
                parse_usdc(bad),
                Err(ValidationError::InvalidAmount(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn two_decimal_amounts_round_trip() {
        for s in ["0.00", "0.01", "9.99", "10.00", "1000.50", "123456789.12"] {
            assert_eq!(format_usdc(parse_usdc(s).unwrap()), s);
        }
    }

    #[test]
    fn formats_with_rounding_and_commas() {
        assert_eq!(format_usdc(0), "0.00");
        assert_eq!(format_usdc(1_234_995), "1.23");
        assert_eq!(format_usdc(1_235_000), "1.24");
        assert_eq!(format_usdc_with_commas(0), "0.00");
        assert_eq!(format_usdc_with_commas(999_990_000), "999.99");
        assert_eq!(format_usdc_with_commas(1_000_500_000), "1,000.50");
        assert_eq!(format_usdc_with_commas(10_000_000 * USDC_UNIT), "10,000,000.00");
    }

    #[test]
    fn yearly_projection_is_simple_interest() {
        for (principal, apy) in [(0.0, 0.1), (5000.0, 0.1), (1234.5, 0.07), (100.0, 0.0)] {
            let diff = calculate_yield(principal, 365, apy) - principal * apy;
            assert!(diff.abs() < 1e-9);
        }
    }

    #[test]
    fn projections_cover_fixed_horizons() {
        let projections = calculate_projections(3650.0, FIXED_APY);
        let days: Vec<u32> = projections.iter().map(|p| p.days).collect();
        assert_eq!(days, vec![1, 7, 30, 90, 365]);
        assert!((projections[0].yield_amount - 1.0).abs() < 1e-9);
        assert!((projections[4].total - 4015.0).abs() < 1e-9);
        assert_eq!(projections[2].period, "Monthly");
    }

    #[test]
    fn voting_power_bounds() {
        assert_eq!(voting_power(0, 0, 0), 1.0);
        assert_eq!(voting_power(8, 5, 3), 2.6);
        assert_eq!(voting_power(10, 10, 10), 4.0);
        assert_eq!(voting_power(30, 30, 30), 4.0);

        let mut last = 0.0;
        for academic in 0..=40 {
            let power = voting_power(academic, 0, 0);
            assert!(power >= last && power <= 4.0);
            last = power;
        }
    }

    #[test]
    fn donation_validation_order() {
        let balance = 100 * USDC_UNIT;
        assert_eq!(validate_donation(0, balance), Err(ValidationError::NonPositiveAmount));
        assert_eq!(
            validate_donation(balance + 1, balance),
            Err(ValidationError::InsufficientBalance)
        );
        assert_eq!(validate_donation(5 * USDC_UNIT, balance), Err(ValidationError::BelowMinimum));
        assert_eq!(validate_donation(5 * USDC_UNIT, 0), Err(ValidationError::InsufficientBalance));
        assert!(validate_donation(MIN_DONATION, balance).is_ok());
        assert!(validate_donation(balance, balance).is_ok());
    }
}
