use crate::collaborators::{CreditLedger, ProjectStore};
use crate::composer::ImagePromptComposer;
use crate::driver::DialogueDriver;
use crate::safety::SafetyReviewer;
use bikeforge_ai::image_provider::ImageProvider;
use bikeforge_core::error::{ForgeError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedImage {
    pub session_id: String,
    pub image_base64: String,
    pub prompt: String,
    pub revised_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Hands a finalized specification to the image oracle, charging credits
/// around the call and refunding them when it fails.
pub struct RenderService {
    dialogue: Arc<DialogueDriver>,
    images: Arc<dyn ImageProvider>,
    composer: ImagePromptComposer,
    ledger: Option<Arc<dyn CreditLedger>>,
    projects: Option<Arc<dyn ProjectStore>>,
    safety: Option<SafetyReviewer>,
    credit_cost: u32,
    timeout: Duration,
    latest: DashMap<String, RenderedImage>,
}

impl RenderService {
    pub fn new(
        dialogue: Arc<DialogueDriver>,
        images: Arc<dyn ImageProvider>,
        composer: ImagePromptComposer,
        timeout: Duration,
    ) -> Self {
        Self {
            dialogue,
            images,
            composer,
            ledger: None,
            projects: None,
            safety: None,
            credit_cost: 1,
            timeout,
            latest: DashMap::new(),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn CreditLedger>, credit_cost: u32) -> Self {
        self.ledger = Some(ledger);
        self.credit_cost = credit_cost;
        self
    }

    pub fn with_project_store(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn with_safety_review(mut self, reviewer: SafetyReviewer) -> Self {
        self.safety = Some(reviewer);
        self
    }

    #[instrument(skip(self))]
    pub async fn render(
        &self,
        session_id: &str,
        user: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<RenderedImage> {
        let spec = self.dialogue.get_specification(session_id).await?;

        if let Some(reviewer) = &self.safety {
            let verdict = reviewer.review(&spec).await;
            if !verdict.is_safe {
                return Err(ForgeError::ContentPolicyViolation {
                    explanation: verdict.explanation,
                    suggestions: verdict.suggestions,
                });
            }
        }

        let prompt = self.composer.compose(&spec);

        let charged = match (&self.ledger, user) {
            (Some(ledger), Some(user)) => {
                if !ledger.has_balance(user, self.credit_cost).await? {
                    return Err(ForgeError::InsufficientCredits(user.to_string()));
                }
                ledger.deduct(user, self.credit_cost).await?;
                Some((ledger, user))
            }
            _ => None,
        };

        let generated = match tokio::time::timeout(self.timeout, self.images.generate(&prompt)).await
        {
            Ok(Ok(image)) => image,
            outcome => {
                let err = match outcome {
                    Ok(Err(e)) if e.is_content_policy() => ForgeError::ContentPolicyViolation {
                        explanation: e.to_string(),
                        suggestions: Vec::new(),
                    },
                    Ok(Err(e)) => ForgeError::OracleUnavailable(e.to_string()),
                    _ => ForgeError::OracleTimeout(self.timeout),
                };
                if let Some((ledger, user)) = charged {
                    match ledger.refund(user, self.credit_cost).await {
                        Ok(()) => info!(user, amount = self.credit_cost, "Refunded credits"),
                        Err(e) => error!(user, "Failed to refund credits: {}", e),
                    }
                }
                warn!(error = %err, "Image generation failed");
                return Err(err);
            }
        };

        let rendered = RenderedImage {
            session_id: session_id.to_string(),
            image_base64: generated.b64_json,
            prompt,
            revised_prompt: generated.revised_prompt,
            created_at: Utc::now(),
        };
        self.latest.insert(session_id.to_string(), rendered.clone());

        if let (Some(projects), Some(project_id)) = (&self.projects, project_id) {
            if let Err(e) = projects.save_image(project_id, &rendered.image_base64).await {
                warn!(project_id, "Failed to save image to project: {}", e);
            }
        }

        info!(model = self.images.model_name(), "Rendered bike image");
        Ok(rendered)
    }

    pub fn latest_image(&self, session_id: &str) -> Result<RenderedImage> {
        self.latest
            .get(session_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ForgeError::ImageNotFound(session_id.to_string()))
    }
}
