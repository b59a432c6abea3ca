use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ToolsConfig;

const KNOWLEDGE_BASE_DESCRIPTION: &str =
    "Knowledge Base with information about Griptape Operational Processes";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolKind {
    /// Retrieval over a hosted knowledge base; the search itself is opaque.
    KnowledgeBase { knowledge_base_id: String },
    /// A hosted tool invoked by id.
    Remote { tool_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: ToolKind,
}

/// A tool plus the description the selection prompt shows for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub key: String,
    pub tool: Tool,
    pub description: String,
}

/// Ordered mapping from logical tool key to descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCatalog {
    entries: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(entries: Vec<ToolDescriptor>) -> Self {
        Self { entries }
    }

    /// Deterministic for a given configuration.
    pub fn from_config(config: &ToolsConfig) -> Self {
        let knowledge_base = |key: &str, name: &str, knowledge_base_id: &str| {
            let tool = Tool {
                name: name.to_owned(),
                description: KNOWLEDGE_BASE_DESCRIPTION.to_owned(),
                kind: ToolKind::KnowledgeBase { knowledge_base_id: knowledge_base_id.to_owned() },
            };
            ToolDescriptor { key: key.to_owned(), description: tool.description.clone(), tool }
        };
        let remote = |key: &str, tool_id: &str, description: &str| ToolDescriptor {
            key: key.to_owned(),
            tool: Tool {
                name: key.to_owned(),
                description: description.to_owned(),
                kind: ToolKind::Remote { tool_id: tool_id.to_owned() },
            },
            description: description.to_owned(),
        };

        Self::new(vec![
            knowledge_base("rv_knowledge_base_tool", "rvKB", &config.rv_knowledge_base_id),
            knowledge_base("truck_knowledge_base_tool", "truckKB", &config.truck_knowledge_base_id),
            knowledge_base("quote_knowledge_base_tool", "quotes", &config.quote_knowledge_base_id),
            remote(
                "github_tool",
                &config.github_tool_id,
                "Intelligent GitHub agent with access to the Griptape and Griptape Cloud repository. Use when asked about the Griptape Framework or Griptape Cloud repository, or GitHub related questions.",
            ),
            remote("slack_tool", &config.slack_tool_id, "Tool with access to Slack APIs."),
        ])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ToolDescriptor> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    /// All tools in catalog order.
    pub fn tools(&self) -> Vec<Tool> {
        self.entries.iter().map(|entry| entry.tool.clone()).collect()
    }

    /// `{"key": "description", ...}` as shown to the selection model.
    pub fn descriptions_json(&self) -> String {
        let descriptions = self
            .entries
            .iter()
            .map(|entry| (entry.key.clone(), Value::String(entry.description.clone())))
            .collect::<Map<String, Value>>();
        Value::Object(descriptions).to_string()
    }
}
