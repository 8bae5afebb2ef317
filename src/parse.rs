//! Locale-tolerant parsing of monetary amounts and calendar dates.
//!
//! Shared by the regex fallback and by validation of model answers, so
//! both paths accept exactly the same formats.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("iso date regex"));

static DOTTED_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("dotted date regex"));

static SHORT_DOTTED_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{2})(?:\D|$)").expect("short dotted date regex")
});

const QUOTES: &str = r#"['"«»„“”]"#;

static WORDED_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{q}?\s*(\d{{1,2}})\s*{q}?\s+([а-щьюяіїєґ']+)\s+(\d{{4}})",
        q = QUOTES
    ))
    .expect("worded date regex")
});

// Same shapes without captures, for locating candidates in a header.
static HEADER_DATE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d{4}-\d{1,2}-\d{1,2}".to_string(),
        r"\d{1,2}\.\d{1,2}\.\d{4}".to_string(),
        format!(
            r"(?i){q}?\s*\d{{1,2}}\s*{q}?\s+[а-щьюяіїєґ']+\s+\d{{4}}(?:\s*(?:року|р\.?))?",
            q = QUOTES
        ),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("header date regex"))
    .collect()
});

/// Genitive month names as they appear in "03 лютого 2026".
const UK_MONTHS: [(&str, u32); 12] = [
    ("січня", 1),
    ("лютого", 2),
    ("березня", 3),
    ("квітня", 4),
    ("травня", 5),
    ("червня", 6),
    ("липня", 7),
    ("серпня", 8),
    ("вересня", 9),
    ("жовтня", 10),
    ("листопада", 11),
    ("грудня", 12),
];

/// Textual markers models and forms use for "no value".
pub fn is_null_marker(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "null" | "none" | "n/a")
}

/// Parse a monetary amount written with either decimal separator, optional
/// thousands separators and a currency suffix.
///
/// Returns `None` for anything that does not reduce to a non-negative number.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() || is_null_marker(text) {
        return None;
    }

    let mut cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(_), None) => cleaned = cleaned.replace(',', "."),
        // "12.724,00": the comma is the decimal separator.
        (Some(comma), Some(dot)) if comma > dot => {
            cleaned = cleaned.replace('.', "").replace(',', ".");
        }
        _ => {}
    }

    let cleaned: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() || cleaned == "-" || cleaned == "." {
        return None;
    }

    let value = Decimal::from_str(cleaned).ok()?;
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    Some(round_cents(value))
}

/// Round to two fractional digits, halves away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a date in ISO, dotted, short dotted or worded Ukrainian form.
///
/// Impossible calendar dates yield `None`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() || is_null_marker(text) {
        return None;
    }

    if let Some(caps) = ISO_DATE_RE.captures(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }

    if let Some(caps) = DOTTED_DATE_RE.captures(text) {
        return ymd(&caps[3], &caps[2], &caps[1]);
    }

    if let Some(caps) = SHORT_DOTTED_DATE_RE.captures(text) {
        let yy: i32 = caps[3].parse().ok()?;
        let year = if yy <= 69 { 2000 + yy } else { 1900 + yy };
        return ymd(&year.to_string(), &caps[2], &caps[1]);
    }

    let lower = text.to_lowercase();
    if let Some(caps) = WORDED_DATE_RE.captures(&lower) {
        if let Some(month) = month_number(&caps[2]) {
            return ymd(&caps[3], &month.to_string(), &caps[1]);
        }
    }

    None
}

/// Earliest parseable date in `text`, by position.
pub fn earliest_date(text: &str) -> Option<NaiveDate> {
    let mut candidates: Vec<(usize, &str)> = HEADER_DATE_RES
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.as_str())))
        .collect();
    candidates.sort_by_key(|(start, _)| *start);
    candidates.into_iter().find_map(|(_, candidate)| parse_date(candidate))
}

fn month_number(name: &str) -> Option<u32> {
    UK_MONTHS
        .iter()
        .find(|(month, _)| *month == name)
        .map(|(_, number)| *number)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
