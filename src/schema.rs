//! Analysis results, provenance and the external record shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Zone in which record creation times are read and date windows apply.
pub const RECORD_TIMEZONE: Tz = chrono_tz::Europe::Kyiv;

// ============================================================================
// Confidence constants
// ============================================================================

pub const REGEX_MAIN_AMOUNT_CONFIDENCE: f64 = 0.75;
pub const REGEX_COURT_FEE_CONFIDENCE: f64 = 0.80;
pub const REGEX_LEGAL_AID_CONFIDENCE: f64 = 0.80;
pub const REGEX_ISSUE_DATE_CONFIDENCE: f64 = 0.92;
pub const LLM_AMOUNT_CONFIDENCE: f64 = 0.88;
pub const LLM_ISSUE_DATE_CONFIDENCE: f64 = 0.90;

// ============================================================================
// Decision outcome
// ============================================================================

/// Outcome of a court decision from the claimant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "позитивне")]
    Positive,
    #[serde(rename = "негативне")]
    Negative,
    #[serde(rename = "часткове")]
    Partial,
    #[serde(rename = "невідоме")]
    Unknown,
}

impl Decision {
    /// Label stored in the result tables.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Positive => "позитивне",
            Decision::Negative => "негативне",
            Decision::Partial => "часткове",
            Decision::Unknown => "невідоме",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Provenance
// ============================================================================

/// Extraction path that produced a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Llm,
    Regex,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::Llm => "llm",
            FieldSource::Regex => "regex",
        }
    }
}

/// Where a value came from and how much we trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: FieldSource,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A field value together with its provenance. Confidence cannot exist
/// without a source because both live in the same optional value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extracted<T> {
    pub value: T,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl<T> Extracted<T> {
    pub fn regex(value: T, confidence: f64, snippet: Option<String>) -> Self {
        Self {
            value,
            provenance: Provenance {
                source: FieldSource::Regex,
                confidence,
                snippet,
            },
        }
    }

    pub fn llm(value: T, confidence: f64) -> Self {
        Self {
            value,
            provenance: Provenance {
                source: FieldSource::Llm,
                confidence,
                snippet: None,
            },
        }
    }

    pub fn source(&self) -> FieldSource {
        self.provenance.source
    }
}

/// How the execution document fields were obtained overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMode {
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "fallback")]
    Fallback,
    #[serde(rename = "llm+fallback")]
    LlmWithFallback,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Llm => "llm",
            ExtractionMode::Fallback => "fallback",
            ExtractionMode::LlmWithFallback => "llm+fallback",
        }
    }
}

// ============================================================================
// Analysis results
// ============================================================================

/// Outcome of processing one decision document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAnalysisResult {
    pub decision: Decision,
    pub main_amount: Option<Decimal>,
    pub court_fee: Option<Decimal>,
    pub legal_aid: Option<Decimal>,
    pub date_of_decision: Option<NaiveDate>,
    pub execution_doc_issue_date: Option<NaiveDate>,
}

impl DecisionAnalysisResult {
    /// A result carrying only the outcome.
    pub fn from_decision(decision: Decision) -> Self {
        Self {
            decision,
            main_amount: None,
            court_fee: None,
            legal_aid: None,
            date_of_decision: None,
            execution_doc_issue_date: None,
        }
    }

    /// Combine with execution document facts. Execution document values win
    /// for amounts; the issue date only exists there.
    pub fn with_execution_facts(self, exec: &ExecutionDocAnalysisResult) -> Self {
        Self {
            decision: self.decision,
            main_amount: exec.main_amount_value().or(self.main_amount),
            court_fee: exec.court_fee_value().or(self.court_fee),
            legal_aid: exec.legal_aid_value().or(self.legal_aid),
            date_of_decision: self.date_of_decision,
            execution_doc_issue_date: exec.issue_date_value().or(self.execution_doc_issue_date),
        }
    }
}

/// Outcome of processing one execution writ, with per-field provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDocAnalysisResult {
    pub main_amount: Option<Extracted<Decimal>>,
    pub court_fee: Option<Extracted<Decimal>>,
    pub legal_aid: Option<Extracted<Decimal>>,
    pub execution_doc_issue_date: Option<Extracted<NaiveDate>>,
    pub mode: ExtractionMode,
}

impl ExecutionDocAnalysisResult {
    pub fn main_amount_value(&self) -> Option<Decimal> {
        self.main_amount.as_ref().map(|f| f.value)
    }

    pub fn court_fee_value(&self) -> Option<Decimal> {
        self.court_fee.as_ref().map(|f| f.value)
    }

    pub fn legal_aid_value(&self) -> Option<Decimal> {
        self.legal_aid.as_ref().map(|f| f.value)
    }

    pub fn issue_date_value(&self) -> Option<NaiveDate> {
        self.execution_doc_issue_date.as_ref().map(|f| f.value)
    }

    /// Sources of all populated fields, in field order.
    pub fn populated_sources(&self) -> Vec<FieldSource> {
        [
            self.main_amount.as_ref().map(Extracted::source),
            self.court_fee.as_ref().map(Extracted::source),
            self.legal_aid.as_ref().map(Extracted::source),
            self.execution_doc_issue_date.as_ref().map(Extracted::source),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// ============================================================================
// External records
// ============================================================================

/// Company on whose behalf the documents are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Issuer {
    Ace,
    Unit,
}

impl Issuer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Issuer::Ace => "Ace",
            Issuer::Unit => "Unit",
        }
    }

    /// View listing incoming documents for this issuer.
    pub fn source_view(&self) -> String {
        format!("_message_documents_{}", self.as_str())
    }

    /// Table receiving analysis rows for this issuer.
    pub fn result_table(&self) -> &'static str {
        match self {
            Issuer::Ace => "docs_decision_ace",
            Issuer::Unit => "docs_decision_unit",
        }
    }
}

impl FromStr for Issuer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ace" => Ok(Issuer::Ace),
            "unit" => Ok(Issuer::Unit),
            other => Err(format!("unknown issuer: {}", other)),
        }
    }
}

/// Kind of document a result row was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Decision,
    ExecutionDoc,
}

/// A document reference read from the record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Creation time as Kyiv wall-clock time.
    #[serde(rename = "message_createdAt", deserialize_with = "record_local_time")]
    pub created_at: NaiveDateTime,
    #[serde(rename = "message_description", default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(rename = "procNum", default, deserialize_with = "null_as_empty")]
    pub proceeding_number: String,
    #[serde(rename = "caseNum", default, deserialize_with = "null_as_empty")]
    pub case_number: String,
    #[serde(rename = "local_path")]
    pub remote_path: String,
}

/// Timestamps with an offset are converted; naive ones are taken as UTC.
fn record_local_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let instant = match DateTime::parse_from_rfc3339(&raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => {
            let naive = raw.parse::<NaiveDateTime>().map_err(serde::de::Error::custom)?;
            Utc.from_utc_datetime(&naive)
        }
    };
    Ok(instant.with_timezone(&RECORD_TIMEZONE).naive_local())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Row inserted by the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    #[serde(rename = "createdAt")]
    pub created_at: NaiveDateTime,
    #[serde(rename = "caseNum")]
    pub case_number: String,
    #[serde(rename = "procNum")]
    pub proceeding_number: String,
    pub decision: Decision,
    pub main_amount: Option<Decimal>,
    pub court_fee: Option<Decimal>,
    pub legal_aid: Option<Decimal>,
    pub collector: Issuer,
    pub date_of_decision: Option<NaiveDate>,
    #[serde(rename = "docType")]
    pub doc_type: DocKind,
    pub local_file_path: String,
    pub date_of_issuance: Option<NaiveDate>,
}

impl ResultRow {
    pub fn from_decision(record: &DocumentRef, result: &DecisionAnalysisResult, issuer: Issuer) -> Self {
        Self {
            created_at: record.created_at,
            case_number: record.case_number.clone(),
            proceeding_number: record.proceeding_number.clone(),
            decision: result.decision,
            main_amount: result.main_amount,
            court_fee: result.court_fee,
            legal_aid: result.legal_aid,
            collector: issuer,
            date_of_decision: result.date_of_decision,
            doc_type: DocKind::Decision,
            local_file_path: record.remote_path.clone(),
            date_of_issuance: result.execution_doc_issue_date,
        }
    }

    pub fn from_execution_doc(
        record: &DocumentRef,
        result: &ExecutionDocAnalysisResult,
        issuer: Issuer,
    ) -> Self {
        Self {
            created_at: record.created_at,
            case_number: record.case_number.clone(),
            proceeding_number: record.proceeding_number.clone(),
            decision: Decision::Unknown,
            main_amount: result.main_amount_value(),
            court_fee: result.court_fee_value(),
            legal_aid: result.legal_aid_value(),
            collector: issuer,
            date_of_decision: None,
            doc_type: DocKind::ExecutionDoc,
            local_file_path: record.remote_path.clone(),
            date_of_issuance: result.issue_date_value(),
        }
    }
}
