use bikeforge_ai::{GenerationConfig, ImageProvider, LLMProvider, LLMProviderFactory};
use bikeforge_core::config_manager::BikeForgeConfig;
use bikeforge_dialogue::{
    CreditLedger, DialogueDriver, ImagePromptComposer, InMemoryProjectStore, InMemorySessionStore,
    LlmRelevanceClassifier, ProjectStore, RelevanceClassifier, RenderService, SafetyReviewer,
    SpecificationValidator,
};
use std::sync::Arc;
use tracing::info;

/// Oracles the services talk to. Split out so tests can plug in scripted ones.
#[derive(Clone)]
pub struct Oracles {
    pub chat: Arc<dyn LLMProvider>,
    pub validation: Arc<dyn LLMProvider>,
    pub images: Arc<dyn ImageProvider>,
}

impl Oracles {
    pub fn from_config(config: &BikeForgeConfig) -> anyhow::Result<Self> {
        Ok(Self {
            chat: LLMProviderFactory::create_chat_provider(&config.llm)?,
            validation: LLMProviderFactory::create_validation_provider(&config.llm)?,
            images: LLMProviderFactory::create_image_provider(&config.image, &config.llm)?,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dialogue: Arc<DialogueDriver>,
    pub render: Arc<RenderService>,
    pub projects: Arc<InMemoryProjectStore>,
}

impl AppState {
    pub fn from_config(config: &BikeForgeConfig) -> anyhow::Result<Self> {
        let oracles = Oracles::from_config(config)?;
        Ok(Self::assemble(config, oracles, None))
    }

    /// Wire the dialogue and render services around the given oracles.
    /// Without a ledger renders are not charged.
    pub fn assemble(
        config: &BikeForgeConfig,
        oracles: Oracles,
        ledger: Option<Arc<dyn CreditLedger>>,
    ) -> Self {
        let projects = Arc::new(InMemoryProjectStore::new());
        let project_store: Arc<dyn ProjectStore> = projects.clone();

        let classifier: Arc<dyn RelevanceClassifier> =
            Arc::new(LlmRelevanceClassifier::new(oracles.validation.clone()));
        let validator = SpecificationValidator::from_config(&config.validation, Some(classifier));
        info!(
            semantic = validator.is_semantic(),
            chat_model = oracles.chat.model_name(),
            image_model = oracles.images.model_name(),
            "Assembling BikeForge services"
        );

        let generation = GenerationConfig {
            temperature: config.llm.temperature,
            max_tokens: Some(config.llm.max_tokens),
            ..Default::default()
        };
        let dialogue = Arc::new(
            DialogueDriver::new(
                oracles.chat,
                Arc::new(InMemorySessionStore::new()),
                validator,
                config.dialogue.clone(),
            )
            .with_generation_config(generation)
            .with_project_store(project_store.clone()),
        );

        let mut render = RenderService::new(
            dialogue.clone(),
            oracles.images,
            ImagePromptComposer::new(config.dialogue.prompt_max_chars),
            config.image.timeout(),
        )
        .with_project_store(project_store);
        if let Some(ledger) = ledger {
            render = render.with_ledger(ledger, config.image.credit_cost);
        }
        if config.image.safety_precheck {
            render = render.with_safety_review(SafetyReviewer::new(
                oracles.validation,
                config.validation.timeout(),
            ));
        }

        Self {
            dialogue,
            render: Arc::new(render),
            projects,
        }
    }
}
