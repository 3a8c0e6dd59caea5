use crate::session::ConversationState;
use async_trait::async_trait;
use bikeforge_core::error::Result;
use dashmap::DashMap;

/// Keyed storage for conversation state. A multi-process deployment swaps
/// the in-memory map for an external store behind the same trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<ConversationState>>;

    async fn put(&self, state: ConversationState) -> Result<()>;

    /// Returns whether a state was removed.
    async fn delete(&self, session_id: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, ConversationState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<ConversationState>> {
        Ok(self.sessions.get(session_id).map(|entry| entry.clone()))
    }

    async fn put(&self, state: ConversationState) -> Result<()> {
        self.sessions.insert(state.session_id.clone(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.remove(session_id).is_some())
    }
}
