use bikeforge_core::catalog::QuestionType;
use bikeforge_core::specification::BikeSpecification;
use serde::{Deserialize, Serialize};

/// One selectable option of a question as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub number: u32,
    pub text: String,
    pub value: String,
}

/// A question the oracle asked: either a catalog question or a custom
/// follow-up. Step counters here are whatever the oracle reported until the
/// driver reconciles them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionInstance {
    pub question_type: QuestionType,
    pub question_text: String,
    /// Empty for free-text follow-ups.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// `None` when the oracle left the position out.
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub parent_question: Option<String>,
    #[serde(default)]
    pub follow_up_count: u32,
    #[serde(default = "default_max_follow_ups")]
    pub max_follow_ups: u32,
}

fn default_max_follow_ups() -> u32 {
    3
}

impl QuestionInstance {
    pub fn is_free_text(&self) -> bool {
        self.options.is_empty()
    }
}

/// A successfully decoded oracle reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOracleReply {
    Question {
        question: QuestionInstance,
        message: String,
    },
    Completion {
        specification: BikeSpecification,
        message: String,
    },
    Error {
        explanation: String,
        message: String,
    },
}

impl StructuredOracleReply {
    /// User-facing line that accompanies the reply.
    pub fn message(&self) -> &str {
        match self {
            StructuredOracleReply::Question { message, .. }
            | StructuredOracleReply::Completion { message, .. }
            | StructuredOracleReply::Error { message, .. } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StructuredOracleReply::Question { .. } => "question",
            StructuredOracleReply::Completion { .. } => "completion",
            StructuredOracleReply::Error { .. } => "error",
        }
    }
}
