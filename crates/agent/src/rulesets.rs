use std::sync::Arc;

use parley_core::domain::ruleset::{Ruleset, RulesetId};
use parley_core::errors::ApplicationError;
use parley_core::ports::RulesetStore;
use tracing::debug;

/// Builds the ordered ruleset list for one run.
#[derive(Clone)]
pub struct RulesetResolver {
    store: Arc<dyn RulesetStore>,
    catalog: Vec<RulesetId>,
}

impl RulesetResolver {
    pub fn new(store: Arc<dyn RulesetStore>, catalog: Vec<String>) -> Self {
        Self { store, catalog: catalog.into_iter().map(RulesetId).collect() }
    }

    /// Identity-bound rulesets (one per key value, in order) when `dynamic_enabled`,
    /// followed by every catalog ruleset. A missing catalog entry is fatal.
    pub async fn resolve(
        &self,
        keys: &[(&str, &str)],
        dynamic_enabled: bool,
    ) -> Result<Vec<Ruleset>, ApplicationError> {
        let mut rulesets = Vec::with_capacity(self.catalog.len() + keys.len());

        if dynamic_enabled {
            for (key, value) in keys {
                debug!(
                    event_name = "pipeline.rulesets.identity_lookup",
                    key = *key,
                    identity = *value,
                    "resolving identity ruleset"
                );
                rulesets.push(self.identity(value).await?);
            }
        }

        for id in &self.catalog {
            let ruleset = self
                .store
                .find_by_id(id)
                .await?
                .ok_or_else(|| ApplicationError::RulesetNotFound(id.0.clone()))?;
            rulesets.push(ruleset);
        }

        Ok(rulesets)
    }

    /// Identity-bound ruleset by name. Absence is not an error: it yields an empty ruleset.
    pub async fn identity(&self, name: &str) -> Result<Ruleset, ApplicationError> {
        Ok(self.store.find_by_name(name).await?.unwrap_or_else(|| Ruleset::empty(name)))
    }
}

/// Dynamic tool selection is on when the global flag is set or any ruleset opts in.
pub fn dynamic_tools_requested(global_flag: bool, rulesets: &[Ruleset]) -> bool {
    global_flag || rulesets.iter().any(Ruleset::wants_dynamic_tools)
}
