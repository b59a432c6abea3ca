//! Agent pipeline for the Slack front-end.
//!
//! Per message the runtime decides which rulesets and tools apply, whether an
//! unaddressed message should be folded into thread memory, runs the agent and,
//! for unsolicited replies, asks a second run whether the answer is worth posting.
//!
//! # Key Types
//!
//! - `AgentRuntime` - request pipeline (see `runtime` module)
//! - `RulesetResolver` - catalog plus identity-bound rulesets
//! - `ToolSelector` - static catalog or model-chosen subset
//! - `AgentInvoker` - one templated run against the `AgentExecutor` port
//! - `RelevanceGate` - structured yes/no on a candidate reply
//!
//! The language model, the ruleset store and conversation memory all sit behind
//! ports in `parley_core::ports`; nothing here talks to the network directly.

pub mod events;
pub mod invoker;
pub mod memory;
pub mod relevance;
pub mod rulesets;
pub mod runtime;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use events::{ChannelSink, TracingSink};
pub use invoker::{AgentInvoker, Invocation, AGENT_INPUT_TEMPLATE};
pub use memory::{ContextOutcome, ContextRecorder};
pub use relevance::{parse_relevance, RelevanceGate};
pub use rulesets::{dynamic_tools_requested, RulesetResolver};
pub use runtime::{AgentRuntime, PipelineOutcome, RuntimeSettings};
pub use tools::{parse_selection, ToolSelector};
