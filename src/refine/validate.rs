//! Enrichment payload validation and normalization.
//!
//! Total by construction: any payload, including a missing or malformed
//! field, yields a fully-typed `Enrichment` with defaults. A field that
//! fails normalization is defaulted and logged, never raised.

use chrono::{Datelike, NaiveDate};
use tracing::debug;

/// Validated enrichment fields, ready to merge with a raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub total_compensation: String,
    pub other_funding: String,
    pub subjects: Vec<String>,
    pub length_in_years: u32,
    pub interest_rating: f64,
    pub deadline: String,
    pub description: Option<String>,
    pub favorited: i64,
    pub show: i64,
    pub links: Vec<String>,
}

/// Normalize a decoded enrichment payload.
pub fn clean_and_validate(payload: &serde_json::Value, today: NaiveDate) -> Enrichment {
    Enrichment {
        total_compensation: normalize_compensation(payload.get("total_compensation")),
        other_funding: payload
            .get("other_funding")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        subjects: string_list(payload.get("subjects")),
        length_in_years: non_negative_int(payload.get("length_in_years")),
        interest_rating: rating(payload.get("interest_rating")),
        deadline: normalize_deadline(payload.get("deadline").and_then(|v| v.as_str()), today),
        description: payload
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        favorited: int_flag(payload.get("favorited"), 0),
        show: int_flag(payload.get("show"), 1),
        links: string_list(payload.get("links")),
    }
}

/// Deadline normalization:
/// - `YYYY-MM` is accepted as-is;
/// - `"Month, YYYY"` is accepted as-is;
/// - a bare month name becomes `"Month, <year>"`, rolling to next year
///   when the month has already passed;
/// - other non-empty text passes through unchanged (e.g. "Rolling deadline");
/// - missing/empty/"N/A" becomes `"NA"`.
pub fn normalize_deadline(raw: Option<&str>, today: NaiveDate) -> String {
    let Some(raw) = raw else {
        return "NA".to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") || trimmed.eq_ignore_ascii_case("na")
    {
        return "NA".to_string();
    }

    if is_year_month(trimmed) {
        return trimmed.to_string();
    }

    // "Month, YYYY" — month name plus an explicit year
    if let Some((month_part, year_part)) = trimmed.split_once(',') {
        if month_from_name(month_part.trim()).is_some()
            && year_part.trim().parse::<i32>().is_ok()
        {
            return trimmed.to_string();
        }
    }

    // Bare month name: the next occurrence of that month
    if let Some(month) = month_from_name(trimmed) {
        let year = if month >= today.month() {
            today.year()
        } else {
            today.year() + 1
        };
        return format!("{}, {}", capitalize(trimmed), year);
    }

    debug!(deadline = trimmed, "deadline not parseable, keeping verbatim");
    trimmed.to_string()
}

fn is_year_month(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[4] == b'-'
        && bytes[5..].iter().all(|b| b.is_ascii_digit())
}

fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lower = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .map(|i| i as u32 + 1)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Compensation: currency-prefixed string, or `"N/A"` for missing/NaN.
/// A bare number gets a dollar prefix.
pub fn normalize_compensation(value: Option<&serde_json::Value>) -> String {
    const CURRENCY: [char; 4] = ['$', '€', '£', '¥'];

    match value {
        Some(serde_json::Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => format!("${n}"),
            _ => "N/A".to_string(),
        },
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("n/a")
                || trimmed.eq_ignore_ascii_case("nan")
            {
                return "N/A".to_string();
            }
            if trimmed.starts_with(CURRENCY) {
                return trimmed.to_string();
            }
            if trimmed.chars().any(|c| c.is_ascii_digit()) {
                return format!("${trimmed}");
            }
            "N/A".to_string()
        }
        _ => "N/A".to_string(),
    }
}

fn non_negative_int(value: Option<&serde_json::Value>) -> u32 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|f| f.max(0.0) as u32).unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.max(0.0) as u32)
            .unwrap_or(0),
        _ => 0,
    }
}

/// Interest rating: clamped to [0.0, 5.0] and snapped to 0.5 steps.
fn rating(value: Option<&serde_json::Value>) -> f64 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    let clamped = raw.clamp(0.0, 5.0);
    (clamped * 2.0).round() / 2.0
}

fn int_flag(value: Option<&serde_json::Value>, default: i64) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|f| f as i64).unwrap_or(default),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(default),
        Some(serde_json::Value::Bool(b)) => *b as i64,
        _ => default,
    }
}

/// Subjects/links: kept only when a list of strings; anything else is empty.
fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
