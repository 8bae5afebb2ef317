//! Prompt rendering plus a policy-wrapped completion call.

use std::sync::Arc;

use tracing::debug;

use crate::chat::CompletionBackend;
use crate::error::InvokeError;
use crate::prompts::PromptTemplate;
use crate::retry::RetryPolicy;
use crate::text::head_chars;

/// Stage-one answers starting with this marker are treated as empty.
pub const ERROR_MARKER: &str = "Помилка";

const LOG_HEAD_CHARS: usize = 500;

/// Invokes the completion backend under a timeout and retry policy.
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl ModelInvoker {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Render `template` with `input` and return the trimmed answer.
    pub async fn invoke(&self, template: &PromptTemplate, input: &str) -> Result<String, InvokeError> {
        let prompt = template.render(input);
        let answer = self
            .policy
            .run(template.name, || self.backend.complete(&prompt))
            .await?;
        let answer = answer.trim().to_string();
        debug!(
            "{} answer length={}, head={:?}",
            template.name,
            answer.chars().count(),
            head_chars(&answer, LOG_HEAD_CHARS)
        );
        Ok(answer)
    }

    /// Decision stage-one call whose unusable answer (empty or an error
    /// message) is replaced by `input` itself.
    pub async fn excerpt(&self, template: &PromptTemplate, input: &str) -> Result<String, InvokeError> {
        let answer = self.invoke(template, input).await?;
        if answer.is_empty() || answer.starts_with(ERROR_MARKER) {
            debug!("{} gave no usable excerpt, using the input text", template.name);
            return Ok(input.to_string());
        }
        Ok(answer)
    }
}
