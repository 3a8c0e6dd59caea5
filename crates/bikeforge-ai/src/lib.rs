pub mod image_provider;
pub mod llm_factory;
pub mod llm_provider;
pub mod openai_provider;

pub use image_provider::{
    GeneratedImage, ImageGenerationError, ImageProvider, OpenAIImageConfig, OpenAIImageProvider,
};
pub use llm_factory::LLMProviderFactory;
pub use llm_provider::*;
pub use openai_provider::{OpenAIChatConfig, OpenAIChatProvider};
