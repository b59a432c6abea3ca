use crate::commands::CommandResult;
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::domain::ruleset::RulesetId;
use parley_core::ports::RulesetStore;
use parley_db::{connect_with_config, ping, DbPool, SqlRulesetStore};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::report(exit_code, output);
    }

    CommandResult::report(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_agent_service(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["agent_service", "database_connectivity", "ruleset_catalog"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_agent_service(config: &AppConfig) -> DoctorCheck {
    let auth = if config.agent.api_key.is_some() { "bearer auth" } else { "no auth" };
    DoctorCheck::pass(
        "agent_service",
        format!(
            "runs posted to `{}/runs` with model `{}` ({auth}, {}s timeout)",
            config.agent.base_url.trim_end_matches('/'),
            config.agent.model,
            config.agent.timeout_secs
        ),
    )
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("ruleset_catalog", "the database was not reachable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("ruleset_catalog", "the database was not reachable"),
                ];
            }
        };

        let checks = match ping(&pool).await {
            Ok(()) => vec![
                DoctorCheck::pass(
                    "database_connectivity",
                    format!("connected using `{}`", config.database.url),
                ),
                check_ruleset_catalog(&pool, &config.rulesets.default_catalog).await,
            ],
            Err(error) => vec![
                DoctorCheck::fail("database_connectivity", format!("SELECT 1 failed: {error}")),
                DoctorCheck::skipped("ruleset_catalog", "the database was not reachable"),
            ],
        };

        pool.close().await;
        checks
    })
}

/// Every catalog id must resolve; a missing one fails every addressed reply.
async fn check_ruleset_catalog(pool: &DbPool, catalog: &[String]) -> DoctorCheck {
    let store = SqlRulesetStore::new(pool.clone());
    let mut missing = Vec::new();

    for id in catalog {
        match store.find_by_id(&RulesetId(id.clone())).await {
            Ok(Some(_)) => {}
            Ok(None) => missing.push(id.as_str()),
            Err(error) => {
                return DoctorCheck::fail(
                    "ruleset_catalog",
                    format!("ruleset lookup failed ({error}); run `parley migrate` first"),
                );
            }
        }
    }

    if missing.is_empty() {
        DoctorCheck::pass("ruleset_catalog", format!("all {} catalog rulesets present", catalog.len()))
    } else {
        DoctorCheck::fail(
            "ruleset_catalog",
            format!("missing catalog rulesets: {}; run `parley seed <file>`", missing.join(", ")),
        )
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
