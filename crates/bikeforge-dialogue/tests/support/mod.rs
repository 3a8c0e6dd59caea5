#![allow(dead_code)]

use async_trait::async_trait;
use bikeforge_ai::image_provider::{GeneratedImage, ImageGenerationError, ImageProvider};
use bikeforge_ai::llm_provider::{GenerationConfig, LLMProvider, LLMResponse, LLMResult, Message};
use bikeforge_core::catalog::{QuestionCatalog, QuestionId};
use bikeforge_core::config_manager::{DialogueConfig, ValidationConfig};
use bikeforge_dialogue::{
    DialogueDriver, InMemorySessionStore, RelevanceClassifier, SpecificationValidator,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub enum Scripted {
    Reply(String),
    Fail(String),
    Stall(Duration),
}

/// Conversational oracle that plays back a queue of canned replies.
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, raw: impl Into<String>) -> &Self {
        self.script.lock().push_back(Scripted::Reply(raw.into()));
        self
    }

    pub fn fail(&self, reason: &str) -> &Self {
        self.script.lock().push_back(Scripted::Fail(reason.to_string()));
        self
    }

    pub fn stall(&self, delay: Duration) -> &Self {
        self.script.lock().push_back(Scripted::Stall(delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_transcript(&self) -> Vec<Message> {
        self.seen.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for ScriptedOracle {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(messages.to_vec());
        let next = self.script.lock().pop_front();
        let content = match next {
            Some(Scripted::Reply(raw)) => raw,
            Some(Scripted::Fail(reason)) => anyhow::bail!(reason),
            Some(Scripted::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                anyhow::bail!("stalled")
            }
            None => anyhow::bail!("script exhausted"),
        };
        Ok(LLMResponse {
            content,
            total_tokens: None,
            finish_reason: Some("stop".to_string()),
            model: "scripted".to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Relevance oracle that either answers a fixed verdict or fails.
pub struct StubClassifier {
    pub verdict: Option<bool>,
    pub calls: AtomicUsize,
}

impl StubClassifier {
    pub fn new(verdict: Option<bool>) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RelevanceClassifier for StubClassifier {
    async fn is_relevant(&self, _value: &str) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
            .ok_or_else(|| anyhow::anyhow!("validation model unavailable"))
    }
}

pub enum ImageOutcome {
    Ok(&'static str),
    Refused,
    Broken,
}

pub struct StubImageProvider {
    pub outcome: ImageOutcome,
    pub prompts: Mutex<Vec<String>>,
}

impl StubImageProvider {
    pub fn new(outcome: ImageOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageProvider for StubImageProvider {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageGenerationError> {
        self.prompts.lock().push(prompt.to_string());
        match self.outcome {
            ImageOutcome::Ok(b64) => Ok(GeneratedImage {
                b64_json: b64.to_string(),
                revised_prompt: None,
            }),
            ImageOutcome::Refused => Err(ImageGenerationError::ContentPolicy(
                "blocked by the safety system".to_string(),
            )),
            ImageOutcome::Broken => Err(ImageGenerationError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "stub-image"
    }
}

pub fn dialogue_config() -> DialogueConfig {
    DialogueConfig {
        oracle_timeout_secs: 1,
        ..Default::default()
    }
}

pub fn driver_with(
    oracle: Arc<ScriptedOracle>,
    classifier: Option<Arc<dyn RelevanceClassifier>>,
) -> (DialogueDriver, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let validator = SpecificationValidator::from_config(&ValidationConfig::default(), classifier);
    let driver = DialogueDriver::new(oracle, store.clone(), validator, dialogue_config());
    (driver, store)
}

pub fn catalog_question(step: usize) -> String {
    let def = QuestionCatalog::get(step - 1);
    let options: Vec<_> = def
        .options_with_custom()
        .iter()
        .enumerate()
        .map(|(i, o)| json!({"number": i + 1, "text": o.text, "value": o.value}))
        .collect();
    json!({
        "type": "question",
        "content": {
            "question_type": def.id.as_str(),
            "question_text": def.prompt,
            "options": options,
            "current_step": step,
            "total_steps": 15,
            "is_complete": false,
            "parent_question": null,
            "follow_up_count": 0,
            "max_follow_ups": 3
        },
        "message": def.prompt
    })
    .to_string()
}

pub fn followup_question(parent: QuestionId, text: &str, reported_step: u32) -> String {
    json!({
        "type": "question",
        "content": {
            "question_type": "custom_followup",
            "question_text": text,
            "options": [],
            "current_step": reported_step,
            "total_steps": 99,
            "parent_question": parent.as_str(),
            "follow_up_count": 1,
            "max_follow_ups": 3
        },
        "message": text
    })
    .to_string()
}

pub fn completion(custom_fields: serde_json::Value) -> String {
    let mut content = serde_json::Map::new();
    for def in QuestionCatalog::iter() {
        content.insert(
            def.id.as_str().to_string(),
            json!(def.options[0].value),
        );
    }
    content.insert("custom_fields".to_string(), custom_fields);
    json!({
        "type": "completion",
        "content": content,
        "message": "Perfect! Here's your complete bike specification."
    })
    .to_string()
}
