//! Azure OpenAI chat completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelSettings;
use crate::error::InvokeError;

/// A text-completion service: one prompt in, one text answer out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InvokeError>;
}

/// Client for a single Azure OpenAI deployment.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl ChatClient {
    pub fn new(settings: &ModelSettings) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            settings.endpoint, settings.deployment, settings.api_version
        );
        Self {
            client: Client::new(),
            url,
            api_key: settings.api_key.clone(),
            deployment: settings.deployment.clone(),
        }
    }

    /// Send a chat completion request and return the first choice's text.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String, InvokeError> {
        let request = CompletionRequest {
            messages,
            temperature: 0.0,
        };

        debug!("Sending request to Azure OpenAI: deployment={}", self.deployment);

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: CompletionResponse = response
            .json()
            .await
            .map_err(|e| InvokeError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &response.usage {
            debug!(
                "Azure OpenAI response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, InvokeError> {
        self.chat(vec![Message::user(prompt)]).await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest {
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Prompts are rendered whole into a single user turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_deployment_url() {
        let settings = ModelSettings {
            endpoint: "https://acme.openai.azure.com".to_string(),
            api_key: "k".to_string(),
            deployment: "gpt-4o".to_string(),
            api_version: "2025-04-01-preview".to_string(),
            timeout: Duration::from_secs(60),
            retry_attempts: 3,
            retry_min_wait: Duration::from_secs(1),
            retry_max_wait: Duration::from_secs(10),
        };
        let client = ChatClient::new(&settings);
        assert_eq!(
            client.url,
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2025-04-01-preview"
        );
    }

    #[test]
    fn test_request_shape() {
        let request = CompletionRequest {
            messages: vec![Message::user("u")],
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "u");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_response_without_usage() {
        let response: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#).unwrap();
        assert!(response.usage.is_none());
        assert_eq!(response.choices[0].message.content.as_deref(), Some("ok"));
    }
}
