use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::Row;
use uuid::Uuid;

use parley_core::domain::ruleset::{Rule, Ruleset, RulesetId};
use parley_core::errors::ExternalServiceError;
use parley_core::ports::RulesetStore;

use super::{RepositoryError, RulesetRepository, RULESET_STORE};
use crate::DbPool;

pub struct SqlRulesetStore {
    pool: DbPool,
}

impl SqlRulesetStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Ruleset>, RepositoryError> {
        let sql = format!("SELECT id, name, rules_json, meta_json FROM rulesets WHERE {column} = ?");
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;

        row.as_ref().map(row_to_ruleset).transpose()
    }
}

fn row_to_ruleset(row: &sqlx::sqlite::SqliteRow) -> Result<Ruleset, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rules_json: String =
        row.try_get("rules_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let meta_json: String =
        row.try_get("meta_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let rules: Vec<Rule> = serde_json::from_str(&rules_json)
        .map_err(|e| RepositoryError::Decode(format!("ruleset `{name}` rules: {e}")))?;
    let meta: Map<String, Value> = serde_json::from_str(&meta_json)
        .map_err(|e| RepositoryError::Decode(format!("ruleset `{name}` meta: {e}")))?;

    Ok(Ruleset { id: Some(RulesetId(id)), name, rules, meta })
}

#[async_trait]
impl RulesetStore for SqlRulesetStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Ruleset>, ExternalServiceError> {
        self.fetch_one_where("name", name).await.map_err(|e| e.into_external(RULESET_STORE))
    }

    async fn find_by_id(&self, id: &RulesetId) -> Result<Option<Ruleset>, ExternalServiceError> {
        self.fetch_one_where("id", &id.0).await.map_err(|e| e.into_external(RULESET_STORE))
    }
}

#[async_trait]
impl RulesetRepository for SqlRulesetStore {
    /// An id-less ruleset keeps the id already stored under its name. A ruleset whose id
    /// exists under another name is renamed in place; if the new name is also taken by a
    /// different row the save fails with the UNIQUE error.
    async fn save(&self, ruleset: Ruleset) -> Result<Ruleset, RepositoryError> {
        let id = match ruleset.id.clone() {
            Some(id) => id,
            None => {
                let existing: Option<String> =
                    sqlx::query_scalar("SELECT id FROM rulesets WHERE name = ?")
                        .bind(&ruleset.name)
                        .fetch_optional(&self.pool)
                        .await?;
                RulesetId(existing.unwrap_or_else(|| Uuid::new_v4().to_string()))
            }
        };
        let rules_json = serde_json::to_string(&ruleset.rules)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let meta_json = serde_json::to_string(&ruleset.meta)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO rulesets (id, name, rules_json, meta_json, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 id = excluded.id,
                 rules_json = excluded.rules_json,
                 meta_json = excluded.meta_json,
                 updated_at = excluded.updated_at
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 rules_json = excluded.rules_json,
                 meta_json = excluded.meta_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&id.0)
        .bind(&ruleset.name)
        .bind(&rules_json)
        .bind(&meta_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Ruleset { id: Some(id), ..ruleset })
    }

    async fn list(&self) -> Result<Vec<Ruleset>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, rules_json, meta_json FROM rulesets ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_ruleset).collect()
    }
}
