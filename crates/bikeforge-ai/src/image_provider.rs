use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageGenerationError {
    /// The provider refused the prompt on safety grounds.
    #[error("Image request rejected by the safety system: {0}")]
    ContentPolicy(String),

    #[error("Image provider error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Image provider request failed: {0}")]
    Transport(String),

    #[error("No image data returned from API")]
    EmptyResponse,
}

impl ImageGenerationError {
    pub fn is_content_policy(&self) -> bool {
        matches!(self, ImageGenerationError::ContentPolicy(_))
    }
}

/// A rendered image as returned by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Base64-encoded PNG bytes
    pub b64_json: String,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

/// Image oracle: prompt in, encoded image out.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageGenerationError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIImageConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub size: String,
    pub timeout_secs: u64,
}

impl Default for OpenAIImageConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            timeout_secs: 180,
        }
    }
}

/// `/images/generations` client
pub struct OpenAIImageProvider {
    config: OpenAIImageConfig,
    client: Client,
}

impl OpenAIImageProvider {
    pub fn new(config: OpenAIImageConfig) -> anyhow::Result<Self> {
        if config.api_key.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("OpenAI API key is required for image generation.");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn build_request(&self, prompt: &str) -> ImageRequest {
        let model = self.config.model.to_lowercase();
        ImageRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            size: self.config.size.clone(),
            n: 1,
            // gpt-image models always return base64 and reject this field
            response_format: (!model.starts_with("gpt-image")).then(|| "b64_json".to_string()),
            quality: model.contains("dall-e-3").then(|| "standard".to_string()),
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAIImageProvider {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageGenerationError> {
        let request = self.build_request(prompt);

        let mut builder = self
            .client
            .post(format!(
                "{}/images/generations",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ImageGenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ImageGenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }

        let parsed: ImageResponse = serde_json::from_str(&body)
            .map_err(|e| ImageGenerationError::Transport(format!("Invalid response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .find_map(|item| {
                item.b64_json.map(|b64_json| GeneratedImage {
                    b64_json,
                    revised_prompt: item.revised_prompt,
                })
            })
            .ok_or(ImageGenerationError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Map an error body onto the error taxonomy; safety refusals are reported
/// either through `code` or only through the message text.
pub fn classify_error(status: u16, body: &str) -> ImageGenerationError {
    let envelope: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    let (code, message) = match envelope {
        Some(ErrorEnvelope { error }) => (error.code.unwrap_or_default(), error.message),
        None => (String::new(), body.to_string()),
    };

    let lowered = message.to_lowercase();
    if code == "content_policy_violation"
        || lowered.contains("safety system")
        || lowered.contains("content policy")
    {
        return ImageGenerationError::ContentPolicy(message);
    }

    ImageGenerationError::Api { status, message }
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    size: String,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}
