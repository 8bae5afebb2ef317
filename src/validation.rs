//! Strict validation of stage-two model answers.
//!
//! The outermost `{...}` block of the answer is parsed as JSON and checked
//! against a closed schema. Amounts and dates go through the same parsers as
//! the regex path; a present but unparseable value fails the whole answer.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ValidationError;
use crate::parse::{is_null_marker, parse_amount, parse_date, round_cents};

static JSON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("json block regex"));

/// Outermost brace-delimited block of `text`, or `text` itself.
pub fn extract_json_block(text: &str) -> &str {
    JSON_BLOCK_RE.find(text).map_or(text, |m| m.as_str())
}

/// Parse and validate a model answer as `T`. Only a JSON object is
/// accepted; serde would otherwise fill struct fields from an array by
/// position.
pub fn parse_answer<T: DeserializeOwned>(answer: &str) -> Result<T, ValidationError> {
    let block = extract_json_block(answer);
    let value: Value = serde_json::from_str(block).map_err(ValidationError::NotJson)?;
    if !value.is_object() {
        return Err(ValidationError::NotObject(json_kind(&value)));
    }
    T::deserialize(value).map_err(ValidationError::Schema)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stage-two answer for a court decision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionAnswer {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "strict_amount")]
    pub main_amount_uah: Option<Decimal>,
    #[serde(default, deserialize_with = "strict_amount")]
    pub court_fee_uah: Option<Decimal>,
    #[serde(default, deserialize_with = "strict_amount")]
    pub legal_aid_uah: Option<Decimal>,
    #[serde(default, deserialize_with = "strict_date")]
    pub decision_date: Option<NaiveDate>,
}

/// Stage-two answer for an execution document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionDocAnswer {
    #[serde(default, deserialize_with = "strict_amount")]
    pub main_amount_uah: Option<Decimal>,
    #[serde(default, deserialize_with = "strict_amount")]
    pub court_fee_uah: Option<Decimal>,
    #[serde(default, deserialize_with = "strict_amount")]
    pub legal_aid_uah: Option<Decimal>,
    #[serde(default, deserialize_with = "strict_date")]
    pub execution_doc_issue_date: Option<NaiveDate>,
}

fn strict_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if is_null_marker(&s) => Ok(None),
        Value::String(s) => parse_amount(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid amount format: {:?}", s))),
        Value::Number(n) => number_amount(&n)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid amount: {}", n))),
        other => Err(D::Error::custom(format!("invalid amount: {}", other))),
    }
}

fn number_amount(n: &serde_json::Number) -> Option<Decimal> {
    let repr = n.to_string();
    let value = if repr.contains(['e', 'E']) {
        Decimal::try_from(n.as_f64()?).ok()?
    } else {
        Decimal::from_str(&repr).ok()?
    };
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    Some(round_cents(value))
}

fn strict_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() || is_null_marker(&s) => Ok(None),
        Value::String(s) => parse_date(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid date format: {:?}", s))),
        other => Err(D::Error::custom(format!("invalid date: {}", other))),
    }
}
