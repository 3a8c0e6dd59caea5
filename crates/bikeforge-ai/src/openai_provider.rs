use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for an OpenAI-style chat-completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatConfig {
    /// API key; optional for self-hosted compatible endpoints
    pub api_key: Option<String>,
    /// Base URL for API (default: https://api.openai.com/v1)
    pub base_url: String,
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for failed requests
    pub max_retries: u32,
    /// Provider name for display purposes
    pub provider_name: String,
}

impl Default for OpenAIChatConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            max_retries: 2,
            provider_name: "openai".to_string(),
        }
    }
}

/// Chat-completions provider used for both the dialogue and the relevance checks
pub struct OpenAIChatProvider {
    config: OpenAIChatConfig,
    client: Client,
}

impl OpenAIChatProvider {
    pub fn new(config: OpenAIChatConfig) -> Result<Self> {
        if config.provider_name == "openai" && config.api_key.as_deref().unwrap_or("").is_empty()
        {
            return Err(anyhow!(
                "OpenAI API key is required. Set OPENAI_API_KEY environment variable."
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Send a request with retry logic
    async fn send_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChatCompletionsResponse> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.try_request(messages, config).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            "{} request failed (attempt {}/{}), retrying: {}",
                            self.config.provider_name,
                            attempt + 1,
                            self.config.max_retries + 1,
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    async fn try_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChatCompletionsResponse> {
        let request = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(config.temperature),
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            stop: config.stop.clone(),
        };

        let mut request_builder = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            request_builder =
                request_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request_builder.send().await.context(format!(
            "Failed to send request to {} Chat Completions API at {}",
            self.config.provider_name, self.config.base_url
        ))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(anyhow!(
                "{} API error ({}): {}",
                self.config.provider_name,
                status,
                error_text
            ));
        }

        let response_text = response
            .text()
            .await
            .context("Failed to read Chat Completions response body")?;

        tracing::debug!(
            model = %self.config.model,
            response = %response_text,
            "Raw chat completions response"
        );

        serde_json::from_str(&response_text).context(format!(
            "Failed to parse {} Chat Completions API response",
            self.config.provider_name
        ))
    }
}

#[async_trait]
impl LLMProvider for OpenAIChatProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let response = self.send_request(messages, config).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in response"))?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default().trim().to_string(),
            total_tokens: response.usage.map(|u| u.total_tokens),
            finish_reason: choice.finish_reason,
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// API request/response types for the Chat Completions API

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_requires_key() {
        let config = OpenAIChatConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(OpenAIChatProvider::new(config).is_err());
    }

    #[test]
    fn test_compatible_endpoint_without_key() {
        let config = OpenAIChatConfig {
            api_key: None,
            base_url: "http://localhost:1234/v1".to_string(),
            provider_name: "openai-compatible".to_string(),
            ..Default::default()
        };
        let provider = OpenAIChatProvider::new(config).unwrap();
        assert_eq!(provider.provider_name(), "openai-compatible");
    }

    #[test]
    fn test_request_omits_unset_parameters() {
        let request = ChatCompletionsRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            temperature: Some(0.1),
            max_tokens: Some(10),
            top_p: None,
            stop: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("top_p").is_none());
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn test_null_content_is_tolerated() {
        let parsed: ChatCompletionsResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
