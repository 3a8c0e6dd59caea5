//! External collaborator contracts consumed by the dialogue and render flows,
//! with in-memory implementations for single-process deployments.

use async_trait::async_trait;
use bikeforge_ai::llm_provider::Message;
use bikeforge_core::error::{ForgeError, Result};
use bikeforge_core::specification::BikeSpecification;
use dashmap::DashMap;

/// Project persistence. Every call is best-effort from the caller's side.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load_conversation(&self, project_id: &str) -> Result<Option<Vec<Message>>>;

    async fn save_conversation(&self, project_id: &str, transcript: &[Message]) -> Result<()>;

    async fn save_configuration(
        &self,
        project_id: &str,
        specification: &BikeSpecification,
    ) -> Result<()>;

    async fn save_image(&self, project_id: &str, image_base64: &str) -> Result<()>;
}

/// Credit balance consulted around image generation.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn has_balance(&self, user: &str, amount: u32) -> Result<bool>;

    /// Fails with `InsufficientCredits` rather than going negative.
    async fn deduct(&self, user: &str, amount: u32) -> Result<()>;

    async fn refund(&self, user: &str, amount: u32) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryProjectStore {
    conversations: DashMap<String, Vec<Message>>,
    configurations: DashMap<String, BikeSpecification>,
    images: DashMap<String, Vec<String>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self, project_id: &str) -> Option<Vec<Message>> {
        self.conversations.get(project_id).map(|c| c.clone())
    }

    pub fn configuration(&self, project_id: &str) -> Option<BikeSpecification> {
        self.configurations.get(project_id).map(|c| c.clone())
    }

    pub fn images(&self, project_id: &str) -> Vec<String> {
        self.images
            .get(project_id)
            .map(|i| i.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn load_conversation(&self, project_id: &str) -> Result<Option<Vec<Message>>> {
        Ok(self.conversation(project_id))
    }

    async fn save_conversation(&self, project_id: &str, transcript: &[Message]) -> Result<()> {
        self.conversations
            .insert(project_id.to_string(), transcript.to_vec());
        Ok(())
    }

    async fn save_configuration(
        &self,
        project_id: &str,
        specification: &BikeSpecification,
    ) -> Result<()> {
        self.configurations
            .insert(project_id.to_string(), specification.clone());
        Ok(())
    }

    async fn save_image(&self, project_id: &str, image_base64: &str) -> Result<()> {
        self.images
            .entry(project_id.to_string())
            .or_default()
            .push(image_base64.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCreditLedger {
    balances: DashMap<String, u32>,
}

impl InMemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user: &str, amount: u32) {
        let mut balance = self.balances.entry(user.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, user: &str) -> u32 {
        self.balances.get(user).map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn has_balance(&self, user: &str, amount: u32) -> Result<bool> {
        Ok(self.balance(user) >= amount)
    }

    async fn deduct(&self, user: &str, amount: u32) -> Result<()> {
        let mut balance = self.balances.entry(user.to_string()).or_insert(0);
        if *balance < amount {
            return Err(ForgeError::InsufficientCredits(user.to_string()));
        }
        *balance -= amount;
        Ok(())
    }

    async fn refund(&self, user: &str, amount: u32) -> Result<()> {
        self.grant(user, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_never_goes_negative() {
        let ledger = InMemoryCreditLedger::new();
        ledger.grant("alex", 2);
        assert!(ledger.has_balance("alex", 2).await.unwrap());
        ledger.deduct("alex", 2).await.unwrap();
        assert!(matches!(
            ledger.deduct("alex", 1).await,
            Err(ForgeError::InsufficientCredits(_))
        ));
        assert_eq!(ledger.balance("alex"), 0);
        ledger.refund("alex", 1).await.unwrap();
        assert_eq!(ledger.balance("alex"), 1);
    }

    #[tokio::test]
    async fn test_project_store_round_trip() {
        let store = InMemoryProjectStore::new();
        assert!(store.load_conversation("p").await.unwrap().is_none());
        store
            .save_conversation("p", &[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(store.load_conversation("p").await.unwrap().unwrap().len(), 1);
        store.save_image("p", "aGVsbG8=").await.unwrap();
        assert_eq!(store.images("p"), vec!["aGVsbG8=".to_string()]);
    }
}
