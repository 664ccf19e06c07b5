//! Comparison helpers shared by domain rules.

use chrono::{DateTime, NaiveDate};

use super::result::RuleEvaluationError;

/// Floor for the tolerance denominator, so two zero amounts compare equal
/// without dividing by zero.
pub const EPSILON: f64 = 1e-9;

/// Symmetric relative difference: `|a - b| / max(|a|, |b|, EPSILON)`.
#[must_use]
pub fn relative_delta(a: f64, b: f64) -> f64 {
    (a - b).abs() / a.abs().max(b.abs()).max(EPSILON)
}

/// `|a - b| <= tolerance * max(|a|, |b|, EPSILON)`.
#[must_use]
pub fn within_relative_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(EPSILON)
}

/// Inclusive date ordering: equal dates are ordered.
#[must_use]
pub fn dates_ordered(earlier: NaiveDate, later: NaiveDate) -> bool {
    earlier <= later
}

/// Folds case and whitespace so tokens can be compared exactly.
///
/// Leading/trailing whitespace is dropped and internal runs collapse to a
/// single space.
#[must_use]
pub fn normalize_token(token: &str) -> String {
    token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parses `YYYY-MM-DD`, or the date part of an RFC 3339 timestamp.
///
/// # Errors
///
/// Returns [`RuleEvaluationError::InvalidInput`] naming `field` when the value
/// is neither.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, RuleEvaluationError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| RuleEvaluationError::invalid_input(format!("{field} is not a date: {value:?}")))
}
