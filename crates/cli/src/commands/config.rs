use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandResult;
use parley_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key, value) in effective_values(&config) {
        let source =
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    CommandResult::report(0, lines.join("\n"))
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    let api_key = if config.agent.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let features = config.features;

    vec![
        ("database.url", "PARLEY_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "PARLEY_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "PARLEY_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        (
            "slack.app_token",
            "PARLEY_SLACK_APP_TOKEN",
            redact_token(config.slack.app_token.expose_secret()),
        ),
        (
            "slack.bot_token",
            "PARLEY_SLACK_BOT_TOKEN",
            redact_token(config.slack.bot_token.expose_secret()),
        ),
        ("agent.base_url", "PARLEY_AGENT_BASE_URL", config.agent.base_url.clone()),
        ("agent.api_key", "PARLEY_AGENT_API_KEY", api_key.to_string()),
        ("agent.model", "PARLEY_AGENT_MODEL", config.agent.model.clone()),
        ("agent.timeout_secs", "PARLEY_AGENT_TIMEOUT_SECS", config.agent.timeout_secs.to_string()),
        (
            "features.dynamic_rulesets",
            "PARLEY_FEATURE_DYNAMIC_RULESETS",
            features.dynamic_rulesets.to_string(),
        ),
        ("features.dynamic_tools", "PARLEY_FEATURE_DYNAMIC_TOOLS", features.dynamic_tools.to_string()),
        (
            "features.context_memory",
            "PARLEY_FEATURE_CONTEXT_MEMORY",
            features.context_memory.to_string(),
        ),
        (
            "features.proactive_replies",
            "PARLEY_FEATURE_PROACTIVE_REPLIES",
            features.proactive_replies.to_string(),
        ),
        ("features.stream", "PARLEY_FEATURE_STREAM", features.stream.to_string()),
        (
            "rulesets.default_catalog",
            "PARLEY_RULESETS_DEFAULT_CATALOG",
            config.rulesets.default_catalog.join(","),
        ),
        (
            "tools.rv_knowledge_base_id",
            "PARLEY_RV_KNOWLEDGE_BASE_ID",
            or_unset(&config.tools.rv_knowledge_base_id),
        ),
        (
            "tools.truck_knowledge_base_id",
            "PARLEY_TRUCK_KNOWLEDGE_BASE_ID",
            or_unset(&config.tools.truck_knowledge_base_id),
        ),
        (
            "tools.quote_knowledge_base_id",
            "PARLEY_QUOTE_KNOWLEDGE_BASE_ID",
            or_unset(&config.tools.quote_knowledge_base_id),
        ),
        ("tools.github_tool_id", "PARLEY_GITHUB_TOOL_ID", config.tools.github_tool_id.clone()),
        ("tools.slack_tool_id", "PARLEY_SLACK_TOOL_ID", config.tools.slack_tool_id.clone()),
        ("server.bind_address", "PARLEY_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        (
            "server.health_check_port",
            "PARLEY_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        ("logging.level", "PARLEY_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "PARLEY_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "<unset>".to_string()
    } else {
        value.to_string()
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
