//! Court decision analysis: outcome classification plus amounts and date.
//!
//! The model path runs two passes over the operative clause. Lexical rules on
//! the clause take precedence over whatever the model says about the outcome,
//! and every failure degrades to keyword classification.

use tracing::{debug, info, warn};

use crate::error::InvokeError;
use crate::invoker::ModelInvoker;
use crate::parse::earliest_date;
use crate::prompts::{DECISION_CLASSIFY, DECISION_EXTRACT};
use crate::schema::{Decision, DecisionAnalysisResult};
use crate::text::{extract_resolution_block, head_chars, normalize_text, tail_chars};
use crate::validation::{parse_answer, DecisionAnswer};

/// Longest clause tail handed to the model.
pub const CLAUSE_CHARS: usize = 8000;
/// Header excerpt given to the classifier as grounding.
pub const HEADER_CHARS: usize = 3000;
/// Header prefix scanned for the decision date.
pub const HEADER_DATE_CHARS: usize = 1200;

const PARTIAL_PHRASES: &[&str] = &["задовольнити частково", "частково задовольнити"];

const NEGATIVE_PHRASES: &[&str] = &[
    "залишити без задоволення",
    "у задоволенні позову відмовити",
    "в задоволенні позову відмовити",
    "у задоволенні позовних вимог відмовити",
    "в задоволенні позовних вимог відмовити",
    "в позові відмовити",
];

const POSITIVE_PHRASES: &[&str] = &[
    "позов задовольнити",
    "задовольнити позов",
    "позовні вимоги задовольнити",
    "задовольнити позовні вимоги",
];

// ============================================================================
// Classifier
// ============================================================================

/// Reduces clause text and model output to a [`Decision`]. Total.
pub struct DecisionClassifier;

impl DecisionClassifier {
    /// Precedence: lexical rules on `clause`, then the model `status`, then
    /// stems in `raw_answer` (or in `clause` when there is no answer).
    pub fn classify(clause: &str, status: Option<&str>, raw_answer: Option<&str>) -> Decision {
        if let Some(decision) = Self::lexical_rule(clause) {
            return decision;
        }
        if let Some(decision) = status.and_then(Self::from_stem) {
            return decision;
        }
        Self::from_stem(raw_answer.unwrap_or(clause)).unwrap_or(Decision::Unknown)
    }

    /// Fixed phrases in the operative clause that decide the outcome.
    pub fn lexical_rule(clause: &str) -> Option<Decision> {
        let text = normalize_text(clause).to_lowercase();
        if PARTIAL_PHRASES.iter().any(|p| text.contains(p)) {
            return Some(Decision::Partial);
        }
        if NEGATIVE_PHRASES.iter().any(|p| text.contains(p)) {
            return Some(Decision::Negative);
        }
        if POSITIVE_PHRASES.iter().any(|p| text.contains(p)) && !text.contains("частково") {
            return Some(Decision::Positive);
        }
        None
    }

    /// Map a status label, or any text containing one, by its stem.
    pub fn from_stem(value: &str) -> Option<Decision> {
        let text = value.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        if text.contains("позитив") {
            Some(Decision::Positive)
        } else if text.contains("негатив") {
            Some(Decision::Negative)
        } else if text.contains("частков") {
            Some(Decision::Partial)
        } else if text.contains("невідом") {
            Some(Decision::Unknown)
        } else {
            None
        }
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Windows cut from one decision document.
struct DecisionWindows {
    clause: String,
    header: String,
}

impl DecisionWindows {
    fn new(text: &str) -> Self {
        let block = extract_resolution_block(text);
        let normalized = normalize_text(text);
        Self {
            clause: tail_chars(&block, CLAUSE_CHARS).to_string(),
            header: head_chars(&normalized, HEADER_CHARS).to_string(),
        }
    }

    fn header_date(&self) -> Option<chrono::NaiveDate> {
        earliest_date(head_chars(&self.header, HEADER_DATE_CHARS))
    }
}

/// Analyzes decision documents with an optional model.
#[derive(Clone)]
pub struct DecisionAnalyzer {
    invoker: Option<ModelInvoker>,
}

impl DecisionAnalyzer {
    pub fn new(invoker: Option<ModelInvoker>) -> Self {
        Self { invoker }
    }

    /// Never fails: model problems fall back to keyword classification.
    pub async fn analyze(&self, text: &str) -> DecisionAnalysisResult {
        let windows = DecisionWindows::new(text);
        debug!(
            "Resolution block length={}, head={:?}",
            windows.clause.chars().count(),
            head_chars(&windows.clause, 500)
        );

        let Some(invoker) = &self.invoker else {
            info!("Model not configured; classifying decision by keywords");
            return Self::keyword_result(&windows);
        };

        let answer = match Self::ask_model(invoker, &windows).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Decision model call failed, using keyword fallback: {}", e);
                return Self::keyword_result(&windows);
            }
        };

        let parsed = match parse_answer::<DecisionAnswer>(&answer) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("Decision answer rejected: {}", e);
                None
            }
        };

        let status = parsed.as_ref().and_then(|p| p.status.as_deref());
        DecisionAnalysisResult {
            decision: DecisionClassifier::classify(&windows.clause, status, Some(&answer)),
            main_amount: parsed.as_ref().and_then(|p| p.main_amount_uah),
            court_fee: parsed.as_ref().and_then(|p| p.court_fee_uah),
            legal_aid: parsed.as_ref().and_then(|p| p.legal_aid_uah),
            date_of_decision: parsed
                .as_ref()
                .and_then(|p| p.decision_date)
                .or_else(|| windows.header_date()),
            execution_doc_issue_date: None,
        }
    }

    async fn ask_model(invoker: &ModelInvoker, windows: &DecisionWindows) -> Result<String, InvokeError> {
        let excerpt = invoker.excerpt(&DECISION_EXTRACT, &windows.clause).await?;
        let input = classification_input(&excerpt, &windows.clause, &windows.header);
        invoker.invoke(&DECISION_CLASSIFY, &input).await
    }

    fn keyword_result(windows: &DecisionWindows) -> DecisionAnalysisResult {
        DecisionAnalysisResult {
            date_of_decision: windows.header_date(),
            ..DecisionAnalysisResult::from_decision(DecisionClassifier::classify(&windows.clause, None, None))
        }
    }
}

/// Stage-two input: the excerpt, plus clause and header when the excerpt
/// does not already contain them.
fn classification_input(excerpt: &str, clause: &str, header: &str) -> String {
    let mut input = excerpt.to_string();
    if !clause.is_empty() && !input.contains(clause) {
        input.push_str("\n\nРезолютивна частина:\n");
        input.push_str(clause);
    }
    if !header.is_empty() && !input.contains(header) {
        input.push_str("\n\nШапка документа:\n");
        input.push_str(header);
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::ScriptedBackend;
    use crate::retry::RetryPolicy;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    const POSITIVE_DOC: &str = "<p>ЗАОЧНЕ РІШЕННЯ</p><p>ІМЕНЕМ УКРАЇНИ</p><p>12 січня 2026 року м. Київ</p>\
        <p>Суд, розглянувши справу, ВИРІШИВ:</p><p>Позов задовольнити.</p>\
        <p>Стягнути з відповідача 5 000,00 грн заборгованості та 3028 грн судового збору.</p>";

    const NEGATIVE_DOC: &str = "Рішення від 02.03.2026. Суд УХВАЛИВ: у задоволенні позову відмовити.";

    fn invoker(backend: Arc<ScriptedBackend>) -> ModelInvoker {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        };
        ModelInvoker::new(backend, policy)
    }

    #[test]
    fn test_lexical_rules() {
        assert_eq!(DecisionClassifier::lexical_rule("Позов задовольнити."), Some(Decision::Positive));
        assert_eq!(
            DecisionClassifier::lexical_rule("Позов задовольнити частково."),
            Some(Decision::Partial)
        );
        assert_eq!(
            DecisionClassifier::lexical_rule("Позов залишити без задоволення."),
            Some(Decision::Negative)
        );
        assert_eq!(
            DecisionClassifier::lexical_rule("У задоволенні позову відмовити."),
            Some(Decision::Negative)
        );
        assert_eq!(DecisionClassifier::lexical_rule("Стягнути борг."), None);
    }

    #[test]
    fn test_status_stems() {
        assert_eq!(DecisionClassifier::from_stem("Позитивне"), Some(Decision::Positive));
        assert_eq!(DecisionClassifier::from_stem(" НЕГАТИВНЕ "), Some(Decision::Negative));
        assert_eq!(DecisionClassifier::from_stem("часткове"), Some(Decision::Partial));
        assert_eq!(DecisionClassifier::from_stem("Невідоме"), Some(Decision::Unknown));
        assert_eq!(DecisionClassifier::from_stem("maybe"), None);
        assert_eq!(DecisionClassifier::from_stem(""), None);
    }

    #[test]
    fn test_classifier_is_total() {
        let inputs = ["", " ", "<>", "&&&", "позитив", "x".repeat(10_000).as_str(), "УХВАЛИВ:"]
            .map(str::to_string);
        for clause in &inputs {
            for status in [None, Some(""), Some("Позитивне"), Some("???")] {
                for raw in [None, Some(""), Some("негативне")] {
                    let _ = DecisionClassifier::classify(clause, status, raw);
                }
            }
        }
        assert_eq!(DecisionClassifier::classify("", None, None), Decision::Unknown);
    }

    #[test]
    fn test_lexical_rule_beats_model_status() {
        let decision = DecisionClassifier::classify(
            "у задоволенні позову відмовити",
            Some("Позитивне"),
            Some("{\"status\": \"Позитивне\"}"),
        );
        assert_eq!(decision, Decision::Negative);
    }

    #[tokio::test]
    async fn test_no_model_uses_keywords_and_header_date() {
        let result = DecisionAnalyzer::new(None).analyze(POSITIVE_DOC).await;
        assert_eq!(result.decision, Decision::Positive);
        assert_eq!(result.date_of_decision, NaiveDate::from_ymd_opt(2026, 1, 12));
        assert_eq!(result.main_amount, None);
    }

    #[tokio::test]
    async fn test_model_amounts_with_lexical_override() {
        let backend = Arc::new(ScriptedBackend::answering(&[
            "У задоволенні позову відмовити.",
            r#"{"status": "Позитивне", "main_amount_uah": null, "court_fee_uah": "3028", "legal_aid_uah": null, "decision_date": null}"#,
        ]));
        let analyzer = DecisionAnalyzer::new(Some(invoker(backend.clone())));
        let result = analyzer.analyze(NEGATIVE_DOC).await;

        assert_eq!(result.decision, Decision::Negative);
        assert_eq!(result.court_fee, Some(Decimal::from_str("3028").unwrap()));
        // Model gave no date; the header supplies it.
        assert_eq!(result.date_of_decision, NaiveDate::from_ymd_opt(2026, 3, 2));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_model_status_used_without_lexical_match() {
        let doc = "Суд ПОСТАНОВИВ: стягнути з відповідача борг.";
        let backend = Arc::new(ScriptedBackend::answering(&[
            "стягнути з відповідача борг.",
            r#"{"status": "Часткове", "decision_date": "2026-02-10"}"#,
        ]));
        let result = DecisionAnalyzer::new(Some(invoker(backend))).analyze(doc).await;
        assert_eq!(result.decision, Decision::Partial);
        assert_eq!(result.date_of_decision, NaiveDate::from_ymd_opt(2026, 2, 10));
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back_to_raw_answer() {
        let doc = "Суд ПОСТАНОВИВ: стягнути з відповідача борг.";
        let backend = Arc::new(ScriptedBackend::answering(&["", "Рішення для позивача позитивне."]));
        let result = DecisionAnalyzer::new(Some(invoker(backend))).analyze(doc).await;
        assert_eq!(result.decision, Decision::Positive);
        assert_eq!(result.main_amount, None);
    }

    #[tokio::test]
    async fn test_transient_failure_falls_back_to_keywords() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(InvokeError::Timeout),
            Err(InvokeError::Connection("reset".to_string())),
            Err(InvokeError::Timeout),
        ]));
        let result = DecisionAnalyzer::new(Some(invoker(backend.clone()))).analyze(POSITIVE_DOC).await;
        assert_eq!(result.decision, Decision::Positive);
        assert_eq!(result.date_of_decision, NaiveDate::from_ymd_opt(2026, 1, 12));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_classifier_input_carries_clause_and_header() {
        let backend = Arc::new(ScriptedBackend::answering(&["Коротка витяжка.", "{}"]));
        DecisionAnalyzer::new(Some(invoker(backend.clone())))
            .analyze(POSITIVE_DOC)
            .await;
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[1].contains("Коротка витяжка."));
        assert!(prompts[1].contains("Резолютивна частина:\n: Позов задовольнити."));
        assert!(prompts[1].contains("Шапка документа:\nЗАОЧНЕ РІШЕННЯ"));
    }

    #[test]
    fn test_classification_input_skips_contained_parts() {
        let input = classification_input("clause and header", "clause", "header");
        assert_eq!(input, "clause and header");
    }
}
