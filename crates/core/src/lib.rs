pub mod config;
pub mod domain;
pub mod errors;
pub mod mentions;
pub mod ports;

pub use domain::conversation::ConversationRun;
pub use domain::message::{ChatMessage, ThreadAlias};
pub use domain::ruleset::{Rule, Ruleset, RulesetId};
pub use domain::tool::{Tool, ToolCatalog, ToolDescriptor, ToolKind};
pub use errors::{ApplicationError, ContractViolation, ExternalServiceError, InterfaceError};
pub use mentions::{extract_mentions, mentions_in_order};
pub use ports::{
    AgentEvent, AgentExecutor, AgentOutput, AgentRunRequest, ConversationMemory, EventSink,
    EventSinks, MemoryAccess, RulesetStore,
};
