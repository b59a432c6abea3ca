use std::time::Duration;

use parley_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&normalize_url(database_url))
        .await
}

/// `SELECT 1` round trip, used by health checks.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

// File-backed URLs get `mode=rwc` so a fresh deployment creates its database.
fn normalize_url(database_url: &str) -> String {
    let url = database_url.trim();
    if url == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if url.starts_with("sqlite://") && !url.contains('?') {
        return format!("{url}?mode=rwc");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, normalize_url, ping};

    #[test]
    fn file_urls_create_missing_databases() {
        assert_eq!(normalize_url("sqlite://parley.db"), "sqlite://parley.db?mode=rwc");
        assert_eq!(normalize_url("sqlite://parley.db?mode=ro"), "sqlite://parley.db?mode=ro");
        assert_eq!(normalize_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn in_memory_pool_answers_ping() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        ping(&pool).await.expect("ping");
    }

    #[tokio::test]
    async fn file_database_is_created_on_connect() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("parley.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
        ping(&pool).await.expect("ping");
        assert!(path.exists());
    }
}
