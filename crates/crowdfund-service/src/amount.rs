//! Wei-scale amount arithmetic on base-10 strings.
//!
//! Integer strings are summed exactly as 256-bit unsigned values. Anything
//! else degrades to f64 with a warning instead of failing.

use std::cmp::Ordering;

use tracing::warn;
use web3::types::U256;

/// Parses a plain base-10 unsigned integer. Signs, decimals, exponents and
/// surrounding text are rejected.
pub fn parse_wei(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_dec_str(raw).ok()
}

/// Lossy f64 view of an amount; unparseable or non-finite input counts as 0.
pub fn to_f64(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Rejects amounts that read as a negative or non-finite number. Text that
/// is not numeric at all passes and counts as zero wherever it is summed.
pub fn check_donation(raw: &str) -> Result<(), String> {
    match raw.trim().parse::<f64>() {
        Ok(v) if !v.is_finite() => Err(format!("Donation amount must be a finite number, got `{}`", raw.trim())),
        Ok(v) if v < 0.0 => Err(format!("Donation amount cannot be negative, got `{}`", raw.trim())),
        _ => Ok(()),
    }
}

/// Adds `amount` to `previous` and returns the new total as a decimal string.
///
/// An empty `previous` is treated as `"0"`. The total never decreases: a
/// negative amount contributes nothing.
pub fn merge(previous: &str, amount: &str) -> String {
    let previous = if previous.trim().is_empty() { "0" } else { previous };

    match (parse_wei(previous), parse_wei(amount)) {
        (Some(a), Some(b)) => match a.checked_add(b) {
            Some(sum) => return sum.to_string(),
            None => warn!(
                "Amount overflow adding {} to {}, falling back to floating point",
                amount, previous
            ),
        },
        _ => warn!(
            "Non-integer amount ({} + {}), falling back to floating point; precision may be lost",
            previous, amount
        ),
    }

    format_f64(to_f64(previous) + to_f64(amount).max(0.0))
}

/// Orders two amounts numerically, exactly when both are integers.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_wei(a), parse_wei(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => to_f64(a).partial_cmp(&to_f64(b)).unwrap_or(Ordering::Equal),
    }
}

fn format_f64(value: f64) -> String {
    // Display never switches to exponent notation for f64
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_wei_exactly() {
        assert_eq!(merge("0", "500000000000000000"), "500000000000000000");
        assert_eq!(
            merge("999999999999999999999999999999", "1"),
            "1000000000000000000000000000000"
        );
        // past 2^53 an f64 would already have rounded this
        assert_eq!(merge("9007199254740993", "0"), "9007199254740993");
    }

    #[test]
    fn empty_previous_counts_as_zero() {
        assert_eq!(merge("", "42"), "42");
    }

    #[test]
    fn non_integer_falls_back_to_float() {
        assert_eq!(merge("1", "0.5"), "1.5");
        assert_eq!(merge("10", "abc"), "10");
        assert_eq!(merge("1.5", "2"), "3.5");
    }

    #[test]
    fn overflow_falls_back_to_float() {
        let max = U256::MAX.to_string();
        let merged = merge(&max, "1");
        assert!(parse_wei(&merged).is_some() || merged.parse::<f64>().is_ok());
        assert!(to_f64(&merged) > 1e77);
    }

    #[test]
    fn negative_amount_never_lowers_the_total() {
        assert_eq!(merge("1000", "-400"), "1000");
        assert_eq!(merge("1.5", "-1"), "1.5");
    }

    #[test]
    fn donation_check_rejects_negative_and_non_finite() {
        assert!(check_donation("-400").is_err());
        assert!(check_donation("-0.5").is_err());
        assert!(check_donation("inf").is_err());
        assert!(check_donation("NaN").is_err());
        assert!(check_donation("500000000000000000").is_ok());
        assert!(check_donation("0.5").is_ok());
        assert!(check_donation("-0").is_ok());
        assert!(check_donation("lots").is_ok());
    }

    #[test]
    fn parse_rejects_signs_and_decimals() {
        assert!(parse_wei("-1").is_none());
        assert!(parse_wei("+1").is_none());
        assert!(parse_wei("1e18").is_none());
        assert!(parse_wei("1.0").is_none());
        assert_eq!(parse_wei(" 12 "), Some(U256::from(12u64)));
    }

    #[test]
    fn to_f64_ignores_garbage() {
        assert_eq!(to_f64("nope"), 0.0);
        assert_eq!(to_f64("inf"), 0.0);
        assert_eq!(to_f64("2.5"), 2.5);
    }

    #[test]
    fn compare_is_numeric() {
        assert_eq!(compare("9", "10"), Ordering::Less);
        assert_eq!(compare("1000000000000000000", "999999999999999999"), Ordering::Greater);
        assert_eq!(compare("1.5", "1"), Ordering::Greater);
    }
}
