//! Execution document analysis: model extraction merged over regex facts.

use tracing::{debug, warn};

use crate::error::InvokeError;
use crate::fallback::{RegexFactExtractor, FALLBACK_WINDOW_CHARS};
use crate::invoker::ModelInvoker;
use crate::merge::merge_execution_doc;
use crate::prompts::{EXECUTION_DOC_CLASSIFY, EXECUTION_DOC_EXTRACT};
use crate::schema::ExecutionDocAnalysisResult;
use crate::text::{normalize_text, tail_chars};
use crate::validation::{parse_answer, ExecutionDocAnswer};

/// Analyzes execution writs with an optional model.
#[derive(Clone)]
pub struct ExecutionDocAnalyzer {
    invoker: Option<ModelInvoker>,
    regex: RegexFactExtractor,
}

impl ExecutionDocAnalyzer {
    pub fn new(invoker: Option<ModelInvoker>) -> Self {
        Self {
            invoker,
            regex: RegexFactExtractor::new(),
        }
    }

    /// Never fails. Without a model, or when the model call fails, the regex
    /// result is returned in `fallback` mode.
    pub async fn analyze(&self, text: &str) -> ExecutionDocAnalysisResult {
        let regex = self.regex.extract(text);

        let Some(invoker) = &self.invoker else {
            return regex;
        };

        let normalized = normalize_text(text);
        let window = tail_chars(&normalized, FALLBACK_WINDOW_CHARS);

        let answer = match Self::ask_model(invoker, window).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Execution document model call failed, using regex fallback: {}", e);
                return merge_execution_doc(None, regex);
            }
        };

        // A rejected answer counts as a model pass that found nothing.
        let parsed = parse_answer::<ExecutionDocAnswer>(&answer).unwrap_or_else(|e| {
            debug!("Execution document answer rejected: {}", e);
            ExecutionDocAnswer::default()
        });

        let merged = merge_execution_doc(Some(&parsed), regex);
        debug!("Execution document mode: {}", merged.mode.as_str());
        merged
    }

    async fn ask_model(invoker: &ModelInvoker, window: &str) -> Result<String, InvokeError> {
        // Stage one feeds stage two verbatim, error text included.
        let excerpt = invoker.invoke(&EXECUTION_DOC_EXTRACT, window).await?;
        invoker.invoke(&EXECUTION_DOC_CLASSIFY, &excerpt).await
    }
}
