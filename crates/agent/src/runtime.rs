use std::sync::Arc;

use parley_core::config::{AppConfig, FeatureFlags, ToolsConfig};
use parley_core::domain::conversation::ConversationRun;
use parley_core::domain::message::ChatMessage;
use parley_core::errors::ApplicationError;
use parley_core::ports::{
    AgentExecutor, ConversationMemory, EventSinks, MemoryAccess, RulesetStore,
};
use tracing::{debug, info};

use crate::invoker::{render_input, AgentInvoker, Invocation, AGENT_INPUT_TEMPLATE};
use crate::memory::ContextRecorder;
use crate::relevance::RelevanceGate;
use crate::rulesets::{dynamic_tools_requested, RulesetResolver};
use crate::tools::ToolSelector;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Reply(String),
    /// An unsolicited reply was generated but the relevance gate turned it down.
    Suppressed,
    ContextRecorded,
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub features: FeatureFlags,
    pub default_catalog: Vec<String>,
    pub tools: ToolsConfig,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            features: config.features,
            default_catalog: config.rulesets.default_catalog.clone(),
            tools: config.tools.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AgentRuntime {
    features: FeatureFlags,
    resolver: RulesetResolver,
    selector: ToolSelector,
    recorder: ContextRecorder,
    memory: Arc<dyn ConversationMemory>,
    invoker: AgentInvoker,
    gate: RelevanceGate,
}

impl AgentRuntime {
    pub fn new(
        executor: Arc<dyn AgentExecutor>,
        rulesets: Arc<dyn RulesetStore>,
        memory: Arc<dyn ConversationMemory>,
        settings: RuntimeSettings,
    ) -> Self {
        let invoker = AgentInvoker::new(executor);
        Self {
            features: settings.features,
            resolver: RulesetResolver::new(rulesets.clone(), settings.default_catalog),
            selector: ToolSelector::new(invoker.clone(), settings.tools),
            recorder: ContextRecorder::new(rulesets, memory.clone()),
            memory,
            gate: RelevanceGate::new(invoker.clone()),
            invoker,
        }
    }

    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    /// One sequential pipeline run for an incoming message.
    pub async fn handle_message(
        &self,
        message: &ChatMessage,
        sinks: EventSinks,
    ) -> Result<PipelineOutcome, ApplicationError> {
        let bot_id = self.recorder.find_bot_mention(&message.text).await?;

        if bot_id.is_none() && !message.direct {
            return self.handle_unaddressed(message).await;
        }

        let mut keys = Vec::with_capacity(2);
        if let Some(bot_id) = bot_id.as_deref() {
            keys.push(("bot_id", bot_id));
        }
        keys.push(("channel_id", message.channel_id.as_str()));

        let text = self.run_agent(message, &keys, MemoryAccess::ReadWrite, sinks).await?;
        info!(
            event_name = "pipeline.reply.ready",
            thread_id = %message.thread,
            reply_len = text.len(),
            "reply generated"
        );
        Ok(PipelineOutcome::Reply(text))
    }

    /// `message` mentions no bot; the lookup already happened in `handle_message`.
    async fn handle_unaddressed(
        &self,
        message: &ChatMessage,
    ) -> Result<PipelineOutcome, ApplicationError> {
        let recorded = self.features.context_memory;
        if recorded {
            self.recorder.record_context(&message.text, &message.thread, &message.user_id).await?;
        }

        if !self.features.proactive_replies {
            debug!(
                event_name = "pipeline.message.unaddressed",
                thread_id = %message.thread,
                recorded,
                "message not addressed to the bot"
            );
            return Ok(if recorded {
                PipelineOutcome::ContextRecorded
            } else {
                PipelineOutcome::Ignored
            });
        }

        let keys = [("channel_id", message.channel_id.as_str())];
        let candidate =
            self.run_agent(message, &keys, MemoryAccess::ReadOnly, EventSinks::none()).await?;

        if self.gate.is_relevant(&message.text, &candidate).await? {
            // The candidate ran read-only; only a reply that is actually posted joins the thread.
            let input = render_input(AGENT_INPUT_TEMPLATE, &input_args(message))?;
            self.memory
                .append_run(&message.thread, ConversationRun::new(input, candidate.clone()))
                .await?;
            info!(
                event_name = "pipeline.memory.reply_recorded",
                thread_id = %message.thread,
                "unsolicited reply recorded"
            );
            Ok(PipelineOutcome::Reply(candidate))
        } else {
            info!(
                event_name = "pipeline.reply.suppressed",
                thread_id = %message.thread,
                "unsolicited reply suppressed"
            );
            Ok(PipelineOutcome::Suppressed)
        }
    }

    async fn run_agent(
        &self,
        message: &ChatMessage,
        keys: &[(&str, &str)],
        memory: MemoryAccess,
        sinks: EventSinks,
    ) -> Result<String, ApplicationError> {
        let rulesets = self.resolver.resolve(keys, self.features.dynamic_rulesets).await?;
        let dynamic_tools = dynamic_tools_requested(self.features.dynamic_tools, &rulesets);
        let tools = self.selector.select(&message.text, &message.thread, dynamic_tools).await?;
        debug!(
            event_name = "pipeline.run.assembled",
            thread_id = %message.thread,
            rulesets = rulesets.len(),
            tools = tools.len(),
            dynamic_tools,
            "assembled agent run"
        );

        let stream = self.features.stream && memory.writes();
        self.invoker
            .invoke(
                Invocation::new(AGENT_INPUT_TEMPLATE, input_args(message))
                .with_rulesets(rulesets)
                .with_tools(tools)
                .in_thread(message.thread.clone(), memory)
                .streaming(stream)
                .announcing_tools(dynamic_tools)
                .with_sinks(sinks),
            )
            .await
    }
}

fn input_args(message: &ChatMessage) -> Vec<String> {
    vec![message.user_id.clone(), message.text.clone()]
}
