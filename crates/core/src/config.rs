use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Knowledge base, Slack personality, identity, Slack formatting and Slack tool rulesets.
pub const DEFAULT_RULESET_CATALOG: [&str; 5] = [
    "f5a9c72b-b367-403e-9872-cdd85431e898",
    "60a368ef-f5ac-4c63-990c-80a7364a22a0",
    "6f35283b-e336-433b-84dd-9ee53e8c69bf",
    "b2cae474-a25c-476b-90a1-f39d588dd711",
    "31b9d849-dade-4c3f-ac31-377ff6f02307",
];

pub const DEFAULT_GITHUB_TOOL_ID: &str = "fb56b523-ec53-4490-937e-013ef0f16299";
pub const DEFAULT_SLACK_TOOL_ID: &str = "17f0ef8c-a5e2-4c2a-8f15-533691225195";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub agent: AgentServiceConfig,
    pub features: FeatureFlags,
    pub rulesets: RulesetCatalogConfig,
    pub tools: ToolsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct AgentServiceConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureFlags {
    pub dynamic_rulesets: bool,
    pub dynamic_tools: bool,
    /// Folds unaddressed thread messages into memory. Experimental: more context, more noise.
    pub context_memory: bool,
    pub proactive_replies: bool,
    pub stream: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            dynamic_rulesets: false,
            dynamic_tools: false,
            context_memory: true,
            proactive_replies: false,
            stream: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RulesetCatalogConfig {
    pub default_catalog: Vec<String>,
}

impl Default for RulesetCatalogConfig {
    fn default() -> Self {
        Self { default_catalog: DEFAULT_RULESET_CATALOG.iter().map(|id| id.to_string()).collect() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolsConfig {
    pub rv_knowledge_base_id: String,
    pub truck_knowledge_base_id: String,
    pub quote_knowledge_base_id: String,
    pub github_tool_id: String,
    pub slack_tool_id: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rv_knowledge_base_id: String::new(),
            truck_knowledge_base_id: String::new(),
            quote_knowledge_base_id: String::new(),
            github_tool_id: DEFAULT_GITHUB_TOOL_ID.to_string(),
            slack_tool_id: DEFAULT_SLACK_TOOL_ID.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub agent_base_url: Option<String>,
    pub agent_model: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub dynamic_rulesets: Option<bool>,
    pub dynamic_tools: Option<bool>,
    pub context_memory: Option<bool>,
    pub proactive_replies: Option<bool>,
    pub default_ruleset_catalog: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://parley.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig { app_token: String::new().into(), bot_token: String::new().into() },
            agent: AgentServiceConfig {
                base_url: "http://localhost:8700".to_string(),
                api_key: None,
                model: "gpt-4o".to_string(),
                timeout_secs: 60,
            },
            features: FeatureFlags::default(),
            rulesets: RulesetCatalogConfig::default(),
            tools: ToolsConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            set(&mut self.database.url, database.url);
            set(&mut self.database.max_connections, database.max_connections);
            set(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value);
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
        }

        if let Some(agent) = patch.agent {
            set(&mut self.agent.base_url, agent.base_url);
            if let Some(agent_api_key_value) = agent.api_key {
                self.agent.api_key = Some(secret_value(agent_api_key_value));
            }
            set(&mut self.agent.model, agent.model);
            set(&mut self.agent.timeout_secs, agent.timeout_secs);
        }

        if let Some(features) = patch.features {
            set(&mut self.features.dynamic_rulesets, features.dynamic_rulesets);
            set(&mut self.features.dynamic_tools, features.dynamic_tools);
            set(&mut self.features.context_memory, features.context_memory);
            set(&mut self.features.proactive_replies, features.proactive_replies);
            set(&mut self.features.stream, features.stream);
        }

        if let Some(rulesets) = patch.rulesets {
            set(&mut self.rulesets.default_catalog, rulesets.default_catalog);
        }

        if let Some(tools) = patch.tools {
            set(&mut self.tools.rv_knowledge_base_id, tools.rv_knowledge_base_id);
            set(&mut self.tools.truck_knowledge_base_id, tools.truck_knowledge_base_id);
            set(&mut self.tools.quote_knowledge_base_id, tools.quote_knowledge_base_id);
            set(&mut self.tools.github_tool_id, tools.github_tool_id);
            set(&mut self.tools.slack_tool_id, tools.slack_tool_id);
        }

        if let Some(server) = patch.server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.health_check_port, server.health_check_port);
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARLEY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PARLEY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PARLEY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("PARLEY_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }

        if let Some(value) = read_env("PARLEY_AGENT_BASE_URL") {
            self.agent.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_AGENT_API_KEY") {
            self.agent.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_AGENT_MODEL") {
            self.agent.model = value;
        }
        if let Some(value) = read_env("PARLEY_AGENT_TIMEOUT_SECS") {
            self.agent.timeout_secs = parse_u64("PARLEY_AGENT_TIMEOUT_SECS", &value)?;
        }

        let flags = [
            ("PARLEY_FEATURE_DYNAMIC_RULESETS", &mut self.features.dynamic_rulesets),
            ("PARLEY_FEATURE_DYNAMIC_TOOLS", &mut self.features.dynamic_tools),
            ("PARLEY_FEATURE_CONTEXT_MEMORY", &mut self.features.context_memory),
            ("PARLEY_FEATURE_PROACTIVE_REPLIES", &mut self.features.proactive_replies),
            ("PARLEY_FEATURE_STREAM", &mut self.features.stream),
        ];
        for (key, flag) in flags {
            if let Some(value) = read_env(key) {
                *flag = parse_bool(key, &value)?;
            }
        }

        if let Some(value) = read_env("PARLEY_RULESETS_DEFAULT_CATALOG") {
            self.rulesets.default_catalog = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }

        let tool_ids = [
            ("PARLEY_RV_KNOWLEDGE_BASE_ID", &mut self.tools.rv_knowledge_base_id),
            ("PARLEY_TRUCK_KNOWLEDGE_BASE_ID", &mut self.tools.truck_knowledge_base_id),
            ("PARLEY_QUOTE_KNOWLEDGE_BASE_ID", &mut self.tools.quote_knowledge_base_id),
            ("PARLEY_GITHUB_TOOL_ID", &mut self.tools.github_tool_id),
            ("PARLEY_SLACK_TOOL_ID", &mut self.tools.slack_tool_id),
        ];
        for (key, field) in tool_ids {
            if let Some(value) = read_env(key) {
                *field = value;
            }
        }

        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("PARLEY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        set(&mut self.database.url, overrides.database_url);
        set(&mut self.logging.level, overrides.log_level);
        set(&mut self.agent.base_url, overrides.agent_base_url);
        set(&mut self.agent.model, overrides.agent_model);
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        set(&mut self.features.dynamic_rulesets, overrides.dynamic_rulesets);
        set(&mut self.features.dynamic_tools, overrides.dynamic_tools);
        set(&mut self.features.context_memory, overrides.context_memory);
        set(&mut self.features.proactive_replies, overrides.proactive_replies);
        set(&mut self.rulesets.default_catalog, overrides.default_ruleset_catalog);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_agent(&self.agent)?;
        validate_rulesets(&self.rulesets)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    Ok(())
}

fn validate_agent(agent: &AgentServiceConfig) -> Result<(), ConfigError> {
    if agent.timeout_secs == 0 || agent.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let base_url = agent.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "agent.base_url must start with http:// or https://".to_string(),
        ));
    }

    if agent.model.trim().is_empty() {
        return Err(ConfigError::Validation("agent.model must not be empty".to_string()));
    }

    let blank_key =
        agent.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(false);
    if blank_key {
        return Err(ConfigError::Validation(
            "agent.api_key is set but blank; remove it or provide a key".to_string(),
        ));
    }

    Ok(())
}

fn validate_rulesets(rulesets: &RulesetCatalogConfig) -> Result<(), ConfigError> {
    if rulesets.default_catalog.is_empty() {
        return Err(ConfigError::Validation(
            "rulesets.default_catalog must list at least one ruleset id".to_string(),
        ));
    }

    if rulesets.default_catalog.iter().any(|id| id.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "rulesets.default_catalog must not contain blank ids".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid_override(key, value)),
    }
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    agent: Option<AgentPatch>,
    features: Option<FeaturesPatch>,
    rulesets: Option<RulesetsPatch>,
    tools: Option<ToolsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FeaturesPatch {
    dynamic_rulesets: Option<bool>,
    dynamic_tools: Option<bool>,
    context_memory: Option<bool>,
    proactive_replies: Option<bool>,
    stream: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesetsPatch {
    default_catalog: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    rv_knowledge_base_id: Option<String>,
    truck_knowledge_base_id: Option<String>,
    quote_knowledge_base_id: Option<String>,
    github_tool_id: Option<String>,
    slack_tool_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
