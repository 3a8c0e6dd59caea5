use crate::prompts::build_relevance_prompt;
use async_trait::async_trait;
use bikeforge_ai::llm_provider::{GenerationConfig, LLMProvider};
use bikeforge_core::config_manager::ValidationConfig;
use bikeforge_core::error::ForgeError;
use bikeforge_core::specification::{custom_field_name_in_bounds, BikeSpecification};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answers whether a free-text value plausibly describes a bike customization.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn is_relevant(&self, value: &str) -> anyhow::Result<bool>;
}

/// Relevance oracle backed by a chat model that answers YES or NO.
pub struct LlmRelevanceClassifier {
    provider: Arc<dyn LLMProvider>,
}

impl LlmRelevanceClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RelevanceClassifier for LlmRelevanceClassifier {
    async fn is_relevant(&self, value: &str) -> anyhow::Result<bool> {
        let response = self
            .provider
            .generate_with_config(
                &build_relevance_prompt(value),
                &GenerationConfig::classifier(10),
            )
            .await?;
        let verdict = response
            .content
            .trim()
            .trim_end_matches(['.', '!'])
            .to_uppercase();
        Ok(verdict == "YES")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    NameOutOfBounds,
    LengthOutOfBounds { chars: usize },
    Irrelevant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedField {
    pub name: String,
    pub reason: RejectionReason,
}

impl RejectedField {
    pub fn to_error(&self) -> ForgeError {
        let detail = match &self.reason {
            RejectionReason::NameOutOfBounds => "field name is empty or too long".to_string(),
            RejectionReason::LengthOutOfBounds { chars } => {
                format!("value has {} characters", chars)
            }
            RejectionReason::Irrelevant => "value does not describe the bike".to_string(),
        };
        ForgeError::ValidationRejected(format!("custom field '{}': {}", self.name, detail))
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub specification: BikeSpecification,
    pub rejected: Vec<RejectedField>,
}

/// Prunes custom fields that fail the length bounds or the relevance check.
/// Catalog fields pass through untouched.
pub struct SpecificationValidator {
    classifier: Option<Arc<dyn RelevanceClassifier>>,
    min_chars: usize,
    max_chars: usize,
    timeout: Duration,
}

impl SpecificationValidator {
    /// Length checks only.
    pub fn syntactic(config: &ValidationConfig) -> Self {
        Self {
            classifier: None,
            min_chars: config.min_custom_chars,
            max_chars: config.max_custom_chars,
            timeout: config.timeout(),
        }
    }

    /// The classifier is consulted only when `semantic_enabled` is set.
    pub fn from_config(
        config: &ValidationConfig,
        classifier: Option<Arc<dyn RelevanceClassifier>>,
    ) -> Self {
        Self {
            classifier: classifier.filter(|_| config.semantic_enabled),
            ..Self::syntactic(config)
        }
    }

    pub fn is_semantic(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn clean(&self, spec: BikeSpecification) -> BikeSpecification {
        self.clean_with_report(spec).await.specification
    }

    pub async fn clean_with_report(&self, mut spec: BikeSpecification) -> ValidationReport {
        let fields = std::mem::take(&mut spec.custom_fields);
        let mut rejected = Vec::new();
        let mut candidates = Vec::new();

        for (name, value) in fields {
            let chars = value.trim().chars().count();
            if !custom_field_name_in_bounds(&name) {
                rejected.push(RejectedField {
                    name,
                    reason: RejectionReason::NameOutOfBounds,
                });
            } else if chars < self.min_chars || chars > self.max_chars {
                rejected.push(RejectedField {
                    name,
                    reason: RejectionReason::LengthOutOfBounds { chars },
                });
            } else {
                candidates.push((name, value));
            }
        }

        let verdicts = match &self.classifier {
            Some(classifier) => {
                join_all(
                    candidates
                        .iter()
                        .map(|(name, value)| self.check_relevance(classifier.as_ref(), name, value)),
                )
                .await
            }
            None => vec![true; candidates.len()],
        };

        for ((name, value), relevant) in candidates.into_iter().zip(verdicts) {
            if relevant {
                spec.custom_fields.insert(name, value);
            } else {
                rejected.push(RejectedField {
                    name,
                    reason: RejectionReason::Irrelevant,
                });
            }
        }

        for field in &rejected {
            warn!(error = %field.to_error(), "Dropped custom field");
        }

        ValidationReport {
            specification: spec,
            rejected,
        }
    }

    /// Fails open: a classifier error or timeout keeps the field.
    async fn check_relevance(
        &self,
        classifier: &dyn RelevanceClassifier,
        name: &str,
        value: &str,
    ) -> bool {
        match tokio::time::timeout(self.timeout, classifier.is_relevant(value)).await {
            Ok(Ok(relevant)) => {
                debug!(field = name, relevant, "Relevance check");
                relevant
            }
            Ok(Err(e)) => {
                warn!(field = name, "Relevance check failed, keeping field: {}", e);
                true
            }
            Err(_) => {
                warn!(field = name, "Relevance check timed out, keeping field");
                true
            }
        }
    }
}
