use async_trait::async_trait;
use thiserror::Error;

use parley_core::domain::ruleset::Ruleset;
use parley_core::errors::ExternalServiceError;
use parley_core::ports::RulesetStore;

pub mod conversation;
pub mod memory;
pub mod ruleset;

pub use conversation::SqlConversationMemory;
pub use memory::{InMemoryConversationMemory, InMemoryRulesetStore};
pub use ruleset::SqlRulesetStore;

pub(crate) const RULESET_STORE: &str = "ruleset_store";
pub(crate) const CONVERSATION_MEMORY: &str = "conversation_memory";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub(crate) fn into_external(self, service: &'static str) -> ExternalServiceError {
        ExternalServiceError::new(service, self.to_string())
    }
}

/// Write side of the ruleset store, used by seeding and operator tooling.
#[async_trait]
pub trait RulesetRepository: RulesetStore {
    /// Inserts or replaces by name. A ruleset without an id gets a fresh one.
    async fn save(&self, ruleset: Ruleset) -> Result<Ruleset, RepositoryError>;
    async fn list(&self) -> Result<Vec<Ruleset>, RepositoryError>;
}
