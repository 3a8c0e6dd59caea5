//! One conversation turn: load state, ask the oracle, interpret, commit.
//!
//! A turn works on a copy of the session state and commits it to the store
//! only after the oracle answered. Turns of the same session are serialized
//! through a per-session async mutex; different sessions never contend.

use crate::collaborators::ProjectStore;
use crate::interpreter::{interpret, FallbackReason, Interpretation};
use crate::prompts::build_system_prompt;
use crate::reply::{QuestionInstance, StructuredOracleReply};
use crate::session::ConversationState;
use crate::store::SessionStore;
use crate::validator::SpecificationValidator;
use bikeforge_ai::llm_provider::{GenerationConfig, LLMProvider, Message};
use bikeforge_core::catalog::{QuestionId, QuestionType};
use bikeforge_core::config_manager::DialogueConfig;
use bikeforge_core::error::{ForgeError, Result};
use bikeforge_core::specification::BikeSpecification;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const ALREADY_COMPLETE_MESSAGE: &str =
    "Your bike specification is already complete. You can generate the image now.";
const UNREADABLE_REPLY_MESSAGE: &str =
    "Sorry, I had trouble understanding that. Please try again.";

/// Why a turn ended in an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
    /// The oracle itself answered with its `error` kind.
    OracleReply,
    /// The oracle's text did not fit the reply schema.
    MalformedReply,
    /// The reply broke the question protocol, e.g. a follow-up over budget.
    ProtocolViolation,
}

/// Outcome of [`DialogueDriver::submit_turn`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnResult {
    Question {
        message: String,
        question: QuestionInstance,
    },
    Completion {
        message: String,
        specification: BikeSpecification,
    },
    Error {
        message: String,
        cause: ErrorCause,
    },
}

impl TurnResult {
    pub fn message(&self) -> &str {
        match self {
            TurnResult::Question { message, .. }
            | TurnResult::Completion { message, .. }
            | TurnResult::Error { message, .. } => message,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, TurnResult::Completion { .. })
    }

    fn protocol_violation(message: impl Into<String>) -> Self {
        TurnResult::Error {
            message: message.into(),
            cause: ErrorCause::ProtocolViolation,
        }
    }
}

pub struct DialogueDriver {
    oracle: Arc<dyn LLMProvider>,
    store: Arc<dyn SessionStore>,
    validator: SpecificationValidator,
    projects: Option<Arc<dyn ProjectStore>>,
    config: DialogueConfig,
    generation: GenerationConfig,
    system_prompt: String,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DialogueDriver {
    pub fn new(
        oracle: Arc<dyn LLMProvider>,
        store: Arc<dyn SessionStore>,
        validator: SpecificationValidator,
        config: DialogueConfig,
    ) -> Self {
        let system_prompt = build_system_prompt(config.max_follow_ups);
        Self {
            oracle,
            store,
            validator,
            projects: None,
            config,
            generation: GenerationConfig::default(),
            system_prompt,
            locks: DashMap::new(),
        }
    }

    pub fn with_project_store(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the session's lock entry once no other turn holds or awaits it.
    fn release_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(session_id, |_, entry| Arc::strong_count(entry) == 1);
    }

    /// Sessions with a turn in flight or queued.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn load_or_new(&self, session_id: &str) -> Result<ConversationState> {
        Ok(match self.store.get(session_id).await? {
            Some(state) => state,
            None => ConversationState::new(session_id, &self.system_prompt),
        })
    }

    /// Existing state, or a freshly seeded and stored one.
    pub async fn begin_or_resume(&self, session_id: &str) -> Result<ConversationState> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.begin_locked(session_id).await
        };
        self.release_lock(session_id, lock);
        result
    }

    async fn begin_locked(&self, session_id: &str) -> Result<ConversationState> {
        if let Some(state) = self.store.get(session_id).await? {
            return Ok(state);
        }
        let state = ConversationState::new(session_id, &self.system_prompt);
        self.store.put(state.clone()).await?;
        info!(session_id, "Started new conversation");
        Ok(state)
    }

    pub async fn submit_turn(&self, session_id: &str, user_message: &str) -> Result<TurnResult> {
        self.submit_turn_for_project(session_id, user_message, None)
            .await
    }

    /// Run one turn. Errors are returned only when the oracle could not be
    /// reached or the session store failed; in both cases nothing is committed.
    #[instrument(skip(self, user_message), fields(step = tracing::field::Empty))]
    pub async fn submit_turn_for_project(
        &self,
        session_id: &str,
        user_message: &str,
        project_id: Option<&str>,
    ) -> Result<TurnResult> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.turn_locked(session_id, user_message, project_id).await
        };
        self.release_lock(session_id, lock);
        result
    }

    async fn turn_locked(
        &self,
        session_id: &str,
        user_message: &str,
        project_id: Option<&str>,
    ) -> Result<TurnResult> {
        let mut state = self.load_or_new(session_id).await?;
        if let Some(spec) = &state.final_specification {
            debug!("Session already complete, not consulting the oracle");
            return Ok(TurnResult::Completion {
                message: ALREADY_COMPLETE_MESSAGE.to_string(),
                specification: spec.clone(),
            });
        }
        if let Some(project_id) = project_id {
            state.project_id = Some(project_id.to_string());
        }

        self.extend_transcript(&mut state, user_message).await;

        let raw = self.ask_oracle(&state.transcript).await?;
        let interpretation = interpret(&raw);
        state.transcript.push(Message::assistant(raw));

        let result = match interpretation {
            Interpretation::Ok(reply) => {
                debug!(kind = reply.kind(), "Interpreted oracle reply");
                self.apply_reply(&mut state, reply).await
            }
            Interpretation::Fallback { message, reason } => {
                warn!(?reason, "Falling back on malformed oracle reply");
                let cause = match reason {
                    FallbackReason::MissingSpecification => ErrorCause::ProtocolViolation,
                    FallbackReason::Malformed(_) => ErrorCause::MalformedReply,
                };
                TurnResult::Error { message, cause }
            }
            Interpretation::Unrecoverable => {
                warn!("Oracle returned an empty reply");
                TurnResult::Error {
                    message: UNREADABLE_REPLY_MESSAGE.to_string(),
                    cause: ErrorCause::MalformedReply,
                }
            }
        };

        tracing::Span::current().record("step", state.current_step);
        state.touch();
        self.store.put(state.clone()).await?;
        self.persist_best_effort(&state, &result).await;

        Ok(result)
    }

    /// Append the user's turn, or replay a persisted project conversation
    /// when the message is empty.
    async fn extend_transcript(&self, state: &mut ConversationState, user_message: &str) {
        if user_message.trim().is_empty() {
            if let (Some(projects), Some(project_id)) = (&self.projects, state.project_id.clone()) {
                match projects.load_conversation(&project_id).await {
                    Ok(Some(history)) => {
                        let appended =
                            state.resume_from_history(history, self.config.max_follow_ups);
                        if appended > 0 {
                            info!(project_id = %project_id, appended, "Resumed conversation from project history");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(project_id = %project_id, "Failed to load project conversation: {}", e),
                }
            }
        }
        state.transcript.push(Message::user(user_message));
    }

    async fn ask_oracle(&self, transcript: &[Message]) -> Result<String> {
        let timeout = self.config.oracle_timeout();
        match tokio::time::timeout(timeout, self.oracle.generate_chat(transcript, &self.generation))
            .await
        {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => {
                warn!("Conversational oracle failed: {}", e);
                Err(ForgeError::OracleUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!("Conversational oracle timed out after {:?}", timeout);
                Err(ForgeError::OracleTimeout(timeout))
            }
        }
    }

    async fn apply_reply(
        &self,
        state: &mut ConversationState,
        reply: StructuredOracleReply,
    ) -> TurnResult {
        match reply {
            StructuredOracleReply::Question {
                mut question,
                message,
            } => {
                if question.question_type.is_custom_followup() {
                    if let Err(violation) = self.accept_followup(state, &mut question) {
                        return violation;
                    }
                } else if let QuestionType::Other(tag) = &question.question_type {
                    info!(question_type = %tag, "Oracle asked a non-catalog question");
                }

                question.total_steps = state.total_steps;
                question.current_step = Some(state.reconcile_step(question.current_step));
                TurnResult::Question { message, question }
            }
            StructuredOracleReply::Completion {
                specification,
                message,
            } => {
                let cleaned = self.validator.clean(specification).await;
                info!(
                    fields = cleaned.total_fields_count(),
                    custom = cleaned.custom_fields.len(),
                    "Conversation complete"
                );
                state.complete(cleaned.clone());
                TurnResult::Completion {
                    message,
                    specification: cleaned,
                }
            }
            StructuredOracleReply::Error { message, .. } => TurnResult::Error {
                message,
                cause: ErrorCause::OracleReply,
            },
        }
    }

    /// Enforce the per-parent follow-up budget and count the follow-up.
    fn accept_followup(
        &self,
        state: &mut ConversationState,
        question: &mut QuestionInstance,
    ) -> std::result::Result<(), TurnResult> {
        let parent = match question
            .parent_question
            .as_deref()
            .map(str::parse::<QuestionId>)
        {
            Some(Ok(parent)) => parent,
            Some(Err(_)) | None => {
                warn!(parent = ?question.parent_question, "Follow-up without a known parent question");
                return Err(TurnResult::protocol_violation(
                    "Sorry, I lost track of which part we were customizing. Please try again.",
                ));
            }
        };

        let max = self.config.max_follow_ups;
        if !state.can_accept_followup(parent, max) {
            warn!(parent = %parent, max, "Follow-up budget exhausted");
            return Err(TurnResult::protocol_violation(format!(
                "We already have {} details for your custom {}. Let's continue with the next question.",
                max,
                parent.label().to_lowercase()
            )));
        }

        let count = state.record_followup(parent);
        debug!(parent = %parent, count, total = state.total_steps, "Recorded custom follow-up");
        question.parent_question = Some(parent.as_str().to_string());
        question.follow_up_count = count;
        question.max_follow_ups = max;
        Ok(())
    }

    async fn persist_best_effort(&self, state: &ConversationState, result: &TurnResult) {
        let (Some(projects), Some(project_id)) = (&self.projects, &state.project_id) else {
            return;
        };
        if let Err(e) = projects
            .save_conversation(project_id, &state.transcript)
            .await
        {
            warn!(project_id = %project_id, "Failed to save conversation: {}", e);
        }
        if let TurnResult::Completion { specification, .. } = result {
            if let Err(e) = projects.save_configuration(project_id, specification).await {
                warn!(project_id = %project_id, "Failed to save configuration: {}", e);
            }
        }
    }

    pub async fn get_specification(&self, session_id: &str) -> Result<BikeSpecification> {
        self.store
            .get(session_id)
            .await?
            .and_then(|state| state.final_specification)
            .ok_or_else(|| ForgeError::SpecificationNotFound(session_id.to_string()))
    }

    pub async fn get_state(&self, session_id: &str) -> Result<Option<ConversationState>> {
        self.store.get(session_id).await
    }
}
