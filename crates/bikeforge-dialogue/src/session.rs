use bikeforge_ai::llm_provider::{Message, MessageRole};
use bikeforge_core::catalog::{QuestionCatalog, QuestionId};
use bikeforge_core::specification::BikeSpecification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::interpreter::{interpret, Interpretation};
use crate::prompts::OPENING_USER_TURN;
use crate::reply::StructuredOracleReply;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    AwaitingAnswer,
    Complete,
}

/// Per-session dialogue record.
///
/// `total_steps` is always the catalog length plus the sum of
/// `custom_followup_counts`; the oracle's own counters never overwrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub transcript: Vec<Message>,
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(default)]
    pub custom_followup_counts: BTreeMap<QuestionId, u32>,
    #[serde(default)]
    pub final_specification: Option<BikeSpecification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Fresh conversation seeded with the system instruction and the opening turn.
    pub fn new(session_id: impl Into<String>, system_prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            project_id: None,
            transcript: vec![
                Message::system(system_prompt),
                Message::user(OPENING_USER_TURN),
            ],
            current_step: 1,
            total_steps: Self::base_steps(),
            custom_followup_counts: BTreeMap::new(),
            final_specification: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn base_steps() -> u32 {
        QuestionCatalog::len() as u32
    }

    pub fn phase(&self) -> ConversationPhase {
        if self.final_specification.is_some() {
            ConversationPhase::Complete
        } else {
            ConversationPhase::AwaitingAnswer
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == ConversationPhase::Complete
    }

    pub fn followups_for(&self, parent: QuestionId) -> u32 {
        self.custom_followup_counts.get(&parent).copied().unwrap_or(0)
    }

    pub fn can_accept_followup(&self, parent: QuestionId, max_follow_ups: u32) -> bool {
        self.followups_for(parent) < max_follow_ups
    }

    /// Count one accepted follow-up for `parent`; returns its new count.
    /// Callers check [`Self::can_accept_followup`] first.
    pub fn record_followup(&mut self, parent: QuestionId) -> u32 {
        let count = self.custom_followup_counts.entry(parent).or_insert(0);
        *count += 1;
        let count = *count;
        self.total_steps = Self::base_steps() + self.custom_followup_counts.values().sum::<u32>();
        count
    }

    /// Adopt the oracle's reported position, clamped into `[1, total_steps]`.
    /// Without a report the current position is kept.
    pub fn reconcile_step(&mut self, reported: Option<u32>) -> u32 {
        let step = reported.unwrap_or(self.current_step);
        self.current_step = step.clamp(1, self.total_steps);
        self.current_step
    }

    pub fn complete(&mut self, specification: BikeSpecification) {
        self.final_specification = Some(specification);
        self.current_step = self.total_steps;
    }

    /// Extend the transcript with a previously persisted conversation,
    /// skipping system messages and whatever prefix is already present.
    /// The appended assistant replies are replayed so follow-up counts and
    /// the step position match the history. Returns the number of appended
    /// messages.
    pub fn resume_from_history(&mut self, history: Vec<Message>, max_follow_ups: u32) -> usize {
        let existing: Vec<&Message> = self
            .transcript
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .collect();
        let incoming: Vec<Message> = history
            .into_iter()
            .filter(|m| m.role != MessageRole::System)
            .collect();

        let shared = existing
            .iter()
            .zip(incoming.iter())
            .take_while(|(a, b)| **a == *b)
            .count();
        let appended: Vec<Message> = incoming.into_iter().skip(shared).collect();
        for message in appended.iter().filter(|m| m.role == MessageRole::Assistant) {
            self.replay_reply(&message.content, max_follow_ups);
        }
        let count = appended.len();
        self.transcript.extend(appended);
        count
    }

    /// Apply the bookkeeping of a stored oracle reply. Follow-ups the
    /// driver rejected at the time are skipped here as well.
    fn replay_reply(&mut self, raw: &str, max_follow_ups: u32) {
        let Interpretation::Ok(StructuredOracleReply::Question { question, .. }) = interpret(raw)
        else {
            return;
        };
        if question.question_type.is_custom_followup() {
            let parent = question
                .parent_question
                .as_deref()
                .and_then(|p| p.parse::<QuestionId>().ok());
            match parent {
                Some(parent) if self.can_accept_followup(parent, max_follow_ups) => {
                    self.record_followup(parent);
                }
                _ => return,
            }
        }
        self.reconcile_step(question.current_step);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ConversationState {
        ConversationState::new("s-1", "rules")
    }

    #[test]
    fn test_new_state_is_seeded() {
        let state = state();
        assert_eq!(state.transcript.len(), 2);
        assert_eq!(state.transcript[0].role, MessageRole::System);
        assert_eq!(state.transcript[1].content, OPENING_USER_TURN);
        assert_eq!(state.total_steps, 15);
        assert_eq!(state.phase(), ConversationPhase::AwaitingAnswer);
    }

    #[test]
    fn test_followups_grow_total_steps() {
        let mut state = state();
        assert_eq!(state.record_followup(QuestionId::Color), 1);
        assert_eq!(state.record_followup(QuestionId::Color), 2);
        assert_eq!(state.record_followup(QuestionId::Seat), 1);
        assert_eq!(state.total_steps, 18);
        assert!(state.can_accept_followup(QuestionId::Color, 3));
        state.record_followup(QuestionId::Color);
        assert!(!state.can_accept_followup(QuestionId::Color, 3));
    }

    #[test]
    fn test_reconcile_step_clamps() {
        let mut state = state();
        assert_eq!(state.reconcile_step(Some(0)), 1);
        assert_eq!(state.reconcile_step(Some(40)), 15);
        assert_eq!(state.reconcile_step(Some(7)), 7);
    }

    #[test]
    fn test_missing_step_keeps_position() {
        let mut state = state();
        state.reconcile_step(Some(14));
        state.record_followup(QuestionId::Color);
        assert_eq!(state.reconcile_step(None), 14);
        assert_eq!(state.current_step, 14);
    }

    #[test]
    fn test_resume_skips_known_prefix_and_system() {
        let mut state = state();
        let history = vec![
            Message::system("old rules"),
            Message::user(OPENING_USER_TURN),
            Message::assistant("{\"type\":\"question\"}"),
            Message::user("2"),
        ];
        assert_eq!(state.resume_from_history(history, 3), 2);
        assert_eq!(state.transcript.len(), 4);
        assert_eq!(state.transcript[3].content, "2");
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = state();
        state.record_followup(QuestionId::Engine);
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
