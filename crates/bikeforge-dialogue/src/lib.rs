pub mod collaborators;
pub mod composer;
pub mod driver;
pub mod interpreter;
pub mod prompts;
pub mod render;
pub mod reply;
pub mod safety;
pub mod session;
pub mod store;
pub mod validator;

pub use collaborators::{CreditLedger, InMemoryCreditLedger, InMemoryProjectStore, ProjectStore};
pub use composer::ImagePromptComposer;
pub use driver::{DialogueDriver, ErrorCause, TurnResult};
pub use interpreter::{interpret, FallbackReason, Interpretation};
pub use render::{RenderService, RenderedImage};
pub use reply::{QuestionInstance, QuestionOption, StructuredOracleReply};
pub use safety::{SafetyReviewer, SafetyVerdict};
pub use session::{ConversationPhase, ConversationState};
pub use store::{InMemorySessionStore, SessionStore};
pub use validator::{
    LlmRelevanceClassifier, RejectedField, RejectionReason, RelevanceClassifier,
    SpecificationValidator, ValidationReport,
};
