use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use parley_core::domain::conversation::ConversationRun;
use parley_core::domain::message::ThreadAlias;
use parley_core::errors::ExternalServiceError;
use parley_core::ports::ConversationMemory;

use super::{RepositoryError, CONVERSATION_MEMORY};
use crate::DbPool;

/// Thread-scoped run log. Runs come back in insertion order.
pub struct SqlConversationMemory {
    pool: DbPool,
}

impl SqlConversationMemory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, thread: &ThreadAlias, run: &ConversationRun) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_runs (id, thread_alias, input, output, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(thread.as_str())
        .bind(&run.input)
        .bind(&run.output)
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn select(&self, thread: &ThreadAlias) -> Result<Vec<ConversationRun>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, input, output, created_at FROM conversation_runs
             WHERE thread_alias = ? ORDER BY rowid ASC",
        )
        .bind(thread.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_run).collect()
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationRun, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let input: String = row.try_get("input").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let output: String =
        row.try_get("output").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let id = Uuid::parse_str(&id).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(ConversationRun { id, input, output, created_at })
}

#[async_trait]
impl ConversationMemory for SqlConversationMemory {
    async fn append_run(
        &self,
        thread: &ThreadAlias,
        run: ConversationRun,
    ) -> Result<(), ExternalServiceError> {
        self.insert(thread, &run).await.map_err(|e| e.into_external(CONVERSATION_MEMORY))
    }

    async fn runs(&self, thread: &ThreadAlias) -> Result<Vec<ConversationRun>, ExternalServiceError> {
        self.select(thread).await.map_err(|e| e.into_external(CONVERSATION_MEMORY))
    }
}
