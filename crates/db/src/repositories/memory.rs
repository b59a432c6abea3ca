use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use parley_core::domain::conversation::ConversationRun;
use parley_core::domain::message::ThreadAlias;
use parley_core::domain::ruleset::{Ruleset, RulesetId};
use parley_core::errors::ExternalServiceError;
use parley_core::ports::{ConversationMemory, RulesetStore};

use super::{RepositoryError, RulesetRepository};

#[derive(Default)]
pub struct InMemoryRulesetStore {
    rulesets: RwLock<Vec<Ruleset>>,
}

impl InMemoryRulesetStore {
    pub fn with_rulesets(rulesets: Vec<Ruleset>) -> Self {
        Self { rulesets: RwLock::new(rulesets) }
    }

    /// Adds or replaces by name.
    pub async fn insert(&self, ruleset: Ruleset) {
        let mut rulesets = self.rulesets.write().await;
        match rulesets.iter_mut().find(|existing| existing.name == ruleset.name) {
            Some(existing) => *existing = ruleset,
            None => rulesets.push(ruleset),
        }
    }
}

#[async_trait]
impl RulesetStore for InMemoryRulesetStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Ruleset>, ExternalServiceError> {
        let rulesets = self.rulesets.read().await;
        Ok(rulesets.iter().find(|ruleset| ruleset.name == name).cloned())
    }

    async fn find_by_id(&self, id: &RulesetId) -> Result<Option<Ruleset>, ExternalServiceError> {
        let rulesets = self.rulesets.read().await;
        Ok(rulesets.iter().find(|ruleset| ruleset.id.as_ref() == Some(id)).cloned())
    }
}

#[async_trait]
impl RulesetRepository for InMemoryRulesetStore {
    /// Same rules as the SQL store: keep the stored id by name, rename in place by id.
    async fn save(&self, ruleset: Ruleset) -> Result<Ruleset, RepositoryError> {
        let mut rulesets = self.rulesets.write().await;
        let by_name = rulesets.iter().position(|existing| existing.name == ruleset.name);
        let id = ruleset
            .id
            .clone()
            .or_else(|| by_name.and_then(|index| rulesets[index].id.clone()))
            .unwrap_or_else(|| RulesetId(Uuid::new_v4().to_string()));
        let saved = Ruleset { id: Some(id.clone()), ..ruleset };

        let slot = by_name.or_else(|| {
            rulesets.iter().position(|existing| existing.id.as_ref() == Some(&id))
        });
        match slot {
            Some(index) => rulesets[index] = saved.clone(),
            None => rulesets.push(saved.clone()),
        }
        Ok(saved)
    }

    async fn list(&self) -> Result<Vec<Ruleset>, RepositoryError> {
        let mut rulesets = self.rulesets.read().await.clone();
        rulesets.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(rulesets)
    }
}

#[derive(Default)]
pub struct InMemoryConversationMemory {
    threads: RwLock<HashMap<ThreadAlias, Vec<ConversationRun>>>,
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn append_run(
        &self,
        thread: &ThreadAlias,
        run: ConversationRun,
    ) -> Result<(), ExternalServiceError> {
        let mut threads = self.threads.write().await;
        threads.entry(thread.clone()).or_default().push(run);
        Ok(())
    }

    async fn runs(&self, thread: &ThreadAlias) -> Result<Vec<ConversationRun>, ExternalServiceError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread).cloned().unwrap_or_default())
    }
}
