//! Collaborator interfaces the pipeline calls into.
//!
//! Everything behind these traits is external: the agent execution service,
//! the ruleset store and the conversation memory store. Thread scoping is an
//! explicit argument on every call; there is no ambient "current thread".

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationRun;
use crate::domain::message::ThreadAlias;
use crate::domain::ruleset::{Ruleset, RulesetId};
use crate::domain::tool::Tool;
use crate::errors::ExternalServiceError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolsChosen { tools: Vec<String>, stream: bool },
    OutputChunk { text: String },
    RunCompleted,
}

/// Observes a run. Sinks never influence the run they observe.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &AgentEvent);
}

#[derive(Clone, Default)]
pub struct EventSinks(Vec<Arc<dyn EventSink>>);

impl EventSinks {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self(sinks)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: &AgentEvent) {
        for sink in &self.0 {
            sink.publish(event);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for EventSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSinks").field("len", &self.0.len()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryAccess {
    ReadWrite,
    ReadOnly,
    Disabled,
}

impl MemoryAccess {
    pub fn reads(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn writes(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

#[derive(Clone, Debug)]
pub struct AgentRunRequest {
    pub input: String,
    pub rulesets: Vec<Ruleset>,
    pub tools: Vec<Tool>,
    pub thread: Option<ThreadAlias>,
    pub memory: MemoryAccess,
    pub stream: bool,
    pub sinks: EventSinks,
}

/// Outcome of one agent run: text or an error artifact, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AgentOutput {
    Text(String),
    Error(String),
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn run(&self, request: AgentRunRequest) -> Result<AgentOutput, ExternalServiceError>;
}

#[async_trait]
pub trait RulesetStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Ruleset>, ExternalServiceError>;
    async fn find_by_id(&self, id: &RulesetId) -> Result<Option<Ruleset>, ExternalServiceError>;
}

#[async_trait]
pub trait ConversationMemory: Send + Sync {
    async fn append_run(
        &self,
        thread: &ThreadAlias,
        run: ConversationRun,
    ) -> Result<(), ExternalServiceError>;
    async fn runs(&self, thread: &ThreadAlias) -> Result<Vec<ConversationRun>, ExternalServiceError>;
}
