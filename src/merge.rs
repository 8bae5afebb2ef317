//! Per-field merge of model and regex values with provenance.

use crate::schema::{
    ExecutionDocAnalysisResult, Extracted, ExtractionMode, FieldSource, LLM_AMOUNT_CONFIDENCE,
    LLM_ISSUE_DATE_CONFIDENCE,
};
use crate::validation::ExecutionDocAnswer;

/// Model value when present, else the regex value. Provenance travels with
/// whichever value is chosen. Without a model answer the regex result is
/// returned unchanged in `fallback` mode.
pub fn merge_execution_doc(
    answer: Option<&ExecutionDocAnswer>,
    regex: ExecutionDocAnalysisResult,
) -> ExecutionDocAnalysisResult {
    let Some(answer) = answer else {
        return ExecutionDocAnalysisResult {
            mode: ExtractionMode::Fallback,
            ..regex
        };
    };

    let mut merged = ExecutionDocAnalysisResult {
        main_amount: pick(answer.main_amount_uah, LLM_AMOUNT_CONFIDENCE, regex.main_amount),
        court_fee: pick(answer.court_fee_uah, LLM_AMOUNT_CONFIDENCE, regex.court_fee),
        legal_aid: pick(answer.legal_aid_uah, LLM_AMOUNT_CONFIDENCE, regex.legal_aid),
        execution_doc_issue_date: pick(
            answer.execution_doc_issue_date,
            LLM_ISSUE_DATE_CONFIDENCE,
            regex.execution_doc_issue_date,
        ),
        mode: ExtractionMode::Llm,
    };

    if merged.populated_sources().contains(&FieldSource::Regex) {
        merged.mode = ExtractionMode::LlmWithFallback;
    }
    merged
}

fn pick<T>(model: Option<T>, confidence: f64, regex: Option<Extracted<T>>) -> Option<Extracted<T>> {
    match model {
        Some(value) => Some(Extracted::llm(value, confidence)),
        None => regex,
    }
}
