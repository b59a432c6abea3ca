use std::sync::Arc;

use parley_agent::{AgentRuntime, RuntimeSettings};
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::errors::ExternalServiceError;
use parley_db::{
    connect_with_config, migrations, DbPool, SqlConversationMemory, SqlRulesetStore,
};
use parley_slack::{events::agent_dispatcher, socket::SocketModeRunner};
use thiserror::Error;
use tracing::info;

use crate::executor::HttpAgentExecutor;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: AgentRuntime,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("agent client setup failed: {0}")]
    AgentClient(#[source] ExternalServiceError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database migrations applied"
    );

    let memory = Arc::new(SqlConversationMemory::new(db_pool.clone()));
    let rulesets = Arc::new(SqlRulesetStore::new(db_pool.clone()));
    let executor = Arc::new(
        HttpAgentExecutor::new(&config.agent, memory.clone()).map_err(BootstrapError::AgentClient)?,
    );

    let agent_runtime =
        AgentRuntime::new(executor, rulesets, memory, RuntimeSettings::from_config(&config));
    let features = agent_runtime.features();
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        dynamic_rulesets = features.dynamic_rulesets,
        dynamic_tools = features.dynamic_tools,
        context_memory = features.context_memory,
        proactive_replies = features.proactive_replies,
        stream = features.stream,
        catalog_size = config.rulesets.default_catalog.len(),
        "agent runtime assembled"
    );

    let slack_runner = SocketModeRunner::with_noop_transport(agent_dispatcher(agent_runtime.clone()));

    Ok(Application { config, db_pool, agent_runtime, slack_runner })
}
