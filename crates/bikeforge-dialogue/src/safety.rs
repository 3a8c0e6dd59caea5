use crate::interpreter::strip_code_fences;
use crate::prompts::build_safety_prompt;
use bikeforge_ai::llm_provider::{GenerationConfig, LLMProvider};
use bikeforge_core::specification::BikeSpecification;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a content-policy review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    #[serde(default = "default_violation_type")]
    pub violation_type: String,
    #[serde(default = "default_risk_level")]
    pub risk_level: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

fn default_violation_type() -> String {
    "none".to_string()
}

fn default_risk_level() -> String {
    "low".to_string()
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            violation_type: default_violation_type(),
            risk_level: default_risk_level(),
            suggestions: Vec::new(),
            explanation: String::new(),
        }
    }

    /// Verdict used when the review itself could not be completed.
    pub fn unverified() -> Self {
        Self {
            is_safe: false,
            violation_type: "validation_error".to_string(),
            risk_level: "medium".to_string(),
            suggestions: vec![
                "modern motorcycle".to_string(),
                "custom design".to_string(),
                "performance bike".to_string(),
            ],
            explanation: "Unable to validate message, please use safer alternatives".to_string(),
        }
    }
}

/// Pre-render review of the user's free-text custom fields. Fails closed.
pub struct SafetyReviewer {
    provider: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl SafetyReviewer {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn review(&self, spec: &BikeSpecification) -> SafetyVerdict {
        if !spec.has_custom_fields() {
            return SafetyVerdict::safe();
        }
        let custom_message = spec
            .custom_fields
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ");

        let prompt = build_safety_prompt(&custom_message);
        let config = GenerationConfig::classifier(300);
        let call = self.provider.generate_with_config(&prompt, &config);
        let verdict = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => parse_verdict(&response.content),
            Ok(Err(e)) => {
                warn!("Safety review failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Safety review timed out after {:?}", self.timeout);
                None
            }
        };

        let verdict = verdict.unwrap_or_else(SafetyVerdict::unverified);
        info!(
            is_safe = verdict.is_safe,
            risk = %verdict.risk_level,
            "Safety review complete"
        );
        verdict
    }
}

fn parse_verdict(raw: &str) -> Option<SafetyVerdict> {
    match serde_json::from_str(strip_code_fences(raw)) {
        Ok(verdict) => Some(verdict),
        Err(e) => {
            warn!("Unparseable safety verdict: {}", e);
            None
        }
    }
}
