use parley_core::config::ToolsConfig;
use parley_core::domain::message::ThreadAlias;
use parley_core::domain::ruleset::{Rule, Ruleset};
use parley_core::domain::tool::{Tool, ToolCatalog};
use parley_core::errors::{ApplicationError, ContractViolation};
use parley_core::ports::MemoryAccess;
use tracing::info;

use crate::invoker::{AgentInvoker, Invocation};

const SELECTION_TEMPLATE: &str = "Given the input, what tools are needed to give an accurate response? Input: '{{ args.0 }}' Tools: {{ args.1 }}";
const NO_TOOLS: &str = "None";

/// Chooses the tools a run may use: the whole catalog, or a model-picked subset.
#[derive(Clone)]
pub struct ToolSelector {
    invoker: AgentInvoker,
    config: ToolsConfig,
}

impl ToolSelector {
    pub fn new(invoker: AgentInvoker, config: ToolsConfig) -> Self {
        Self { invoker, config }
    }

    pub async fn select(
        &self,
        message: &str,
        thread: &ThreadAlias,
        dynamic: bool,
    ) -> Result<Vec<Tool>, ApplicationError> {
        let catalog = ToolCatalog::from_config(&self.config);
        if !dynamic {
            return Ok(catalog.tools());
        }

        let response = self
            .invoker
            .invoke(
                Invocation::new(
                    SELECTION_TEMPLATE,
                    vec![message.to_owned(), catalog.descriptions_json()],
                )
                .with_rulesets(vec![selection_ruleset()])
                .in_thread(thread.clone(), MemoryAccess::ReadOnly),
            )
            .await?;

        let tools = parse_selection(&response, &catalog)?;
        info!(
            event_name = "pipeline.tools.selected",
            thread_id = %thread,
            tools = ?tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>(),
            "tools needed"
        );
        Ok(tools)
    }
}

fn selection_ruleset() -> Ruleset {
    Ruleset::new(
        "tool_selection",
        vec![
            Rule::text(
                "The tool name is the key in the tools dictionary, and the description is the value.",
            ),
            Rule::text("Only respond with a comma-separated list of tool names."),
            Rule::text("Do not include any other information."),
            Rule::text("If no tools are needed, respond with 'None'."),
        ],
    )
}

/// Maps a selector response onto catalog tools, keeping the response's order.
///
/// `"None"` (after trimming) selects nothing. Every other comma-separated token must
/// name a catalog key exactly; the first one that does not fails the whole selection.
pub fn parse_selection(response: &str, catalog: &ToolCatalog) -> Result<Vec<Tool>, ContractViolation> {
    let response = response.trim();
    if response == NO_TOOLS {
        return Ok(Vec::new());
    }

    response
        .split(',')
        .map(str::trim)
        .map(|token| {
            catalog.get(token).map(|descriptor| descriptor.tool.clone()).ok_or_else(|| {
                ContractViolation::UnknownTool {
                    token: token.to_owned(),
                    known: catalog.keys().join(", "),
                }
            })
        })
        .collect()
}
