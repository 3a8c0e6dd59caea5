use crate::image_provider::{ImageProvider, OpenAIImageConfig, OpenAIImageProvider};
use crate::llm_provider::*;
use crate::openai_provider::{OpenAIChatConfig, OpenAIChatProvider};
use anyhow::{anyhow, Result};
use bikeforge_core::config_manager::{ImageConfig, LLMConfig};
use std::sync::Arc;

/// Factory for creating oracle providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Conversational oracle
    pub fn create_chat_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        Self::create_for_model(config, &config.chat_model)
    }

    /// Relevance and safety oracle; same endpoint, lighter model
    pub fn create_validation_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        Self::create_for_model(config, &config.validation_model)
    }

    fn create_for_model(config: &LLMConfig, model: &str) -> Result<Arc<dyn LLMProvider>> {
        let provider_name = config.provider.to_lowercase();

        match provider_name.as_str() {
            "openai" | "openai-compatible" => {
                let chat_config = OpenAIChatConfig {
                    api_key: config.api_key.clone(),
                    base_url: config.base_url.clone(),
                    model: model.to_string(),
                    timeout_secs: config.timeout_secs,
                    max_retries: config.max_retries,
                    provider_name,
                };
                Ok(Arc::new(OpenAIChatProvider::new(chat_config)?))
            }
            _ => Err(anyhow!(
                "Unsupported LLM provider: {}. Available providers: openai, openai-compatible",
                provider_name
            )),
        }
    }

    /// Image oracle; the key falls back to the LLM key
    pub fn create_image_provider(
        image: &ImageConfig,
        llm: &LLMConfig,
    ) -> Result<Arc<dyn ImageProvider>> {
        let config = OpenAIImageConfig {
            api_key: image.api_key.clone().or_else(|| llm.api_key.clone()),
            base_url: image.base_url.clone(),
            model: image.model.clone(),
            size: image.size.clone(),
            timeout_secs: image.timeout_secs,
        };
        Ok(Arc::new(OpenAIImageProvider::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_provider() {
        let config = LLMConfig {
            provider: "carrier-pigeon".to_string(),
            api_key: Some("sk".to_string()),
            ..Default::default()
        };
        assert!(LLMProviderFactory::create_chat_provider(&config).is_err());
    }

    #[test]
    fn test_models_follow_config() {
        let config = LLMConfig {
            api_key: Some("sk".to_string()),
            chat_model: "chat-model".to_string(),
            validation_model: "check-model".to_string(),
            ..Default::default()
        };
        let chat = LLMProviderFactory::create_chat_provider(&config).unwrap();
        let check = LLMProviderFactory::create_validation_provider(&config).unwrap();
        assert_eq!(chat.model_name(), "chat-model");
        assert_eq!(check.model_name(), "check-model");
    }

    #[test]
    fn test_image_key_falls_back_to_llm_key() {
        let llm = LLMConfig {
            api_key: Some("sk".to_string()),
            ..Default::default()
        };
        let image = ImageConfig::default();
        let provider = LLMProviderFactory::create_image_provider(&image, &llm).unwrap();
        assert_eq!(provider.model_name(), "dall-e-3");
    }
}
