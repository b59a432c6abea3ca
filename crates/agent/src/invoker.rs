use std::sync::Arc;

use parley_core::domain::message::ThreadAlias;
use parley_core::domain::ruleset::Ruleset;
use parley_core::domain::tool::Tool;
use parley_core::errors::ApplicationError;
use parley_core::ports::{
    AgentEvent, AgentExecutor, AgentOutput, AgentRunRequest, EventSinks, MemoryAccess,
};
use tera::{Context, Tera};
use tracing::{debug, warn};

/// Input for the main run: `args.0` is the acting user id, `args.1` the message text.
pub const AGENT_INPUT_TEMPLATE: &str = "user_id '<@{{ args.0 }}>': {{ args.1 }}";

/// Everything one agent run needs. Built per request and consumed by [`AgentInvoker::invoke`].
#[derive(Clone, Debug)]
pub struct Invocation {
    pub template: String,
    pub args: Vec<String>,
    pub rulesets: Vec<Ruleset>,
    pub tools: Vec<Tool>,
    pub thread: Option<ThreadAlias>,
    pub memory: MemoryAccess,
    pub stream: bool,
    /// Publish `ToolsChosen` before the run. Set when tools were picked dynamically.
    pub announce_tools: bool,
    pub sinks: EventSinks,
}

impl Invocation {
    pub fn new(template: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            template: template.into(),
            args,
            rulesets: Vec::new(),
            tools: Vec::new(),
            thread: None,
            memory: MemoryAccess::Disabled,
            stream: false,
            announce_tools: false,
            sinks: EventSinks::none(),
        }
    }

    pub fn with_rulesets(mut self, rulesets: Vec<Ruleset>) -> Self {
        self.rulesets = rulesets;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn in_thread(mut self, thread: ThreadAlias, memory: MemoryAccess) -> Self {
        self.thread = Some(thread);
        self.memory = memory;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn announcing_tools(mut self, announce: bool) -> Self {
        self.announce_tools = announce;
        self
    }

    pub fn with_sinks(mut self, sinks: EventSinks) -> Self {
        self.sinks = sinks;
        self
    }
}

#[derive(Clone)]
pub struct AgentInvoker {
    executor: Arc<dyn AgentExecutor>,
}

impl AgentInvoker {
    pub fn new(executor: Arc<dyn AgentExecutor>) -> Self {
        Self { executor }
    }

    pub async fn invoke(&self, invocation: Invocation) -> Result<String, ApplicationError> {
        let input = render_input(&invocation.template, &invocation.args)?;

        if invocation.announce_tools {
            let tools = invocation.tools.iter().map(|tool| tool.name.clone()).collect();
            invocation
                .sinks
                .publish(&AgentEvent::ToolsChosen { tools, stream: invocation.stream });
        }

        let sinks = invocation.sinks.clone();
        let thread_id = invocation.thread.as_ref().map(ThreadAlias::to_string);
        let request = AgentRunRequest {
            input,
            rulesets: invocation.rulesets,
            tools: invocation.tools,
            thread: invocation.thread,
            memory: invocation.memory,
            stream: invocation.stream,
            sinks: invocation.sinks,
        };

        match self.executor.run(request).await? {
            AgentOutput::Text(text) => {
                sinks.publish(&AgentEvent::RunCompleted);
                debug!(
                    event_name = "pipeline.agent.completed",
                    thread_id = thread_id.as_deref().unwrap_or("none"),
                    output_len = text.len(),
                    "agent run completed"
                );
                Ok(text)
            }
            AgentOutput::Error(message) => {
                warn!(
                    event_name = "pipeline.agent.error_output",
                    thread_id = thread_id.as_deref().unwrap_or("none"),
                    error = %message,
                    "agent run returned an error artifact"
                );
                Err(ApplicationError::AgentRun(message))
            }
        }
    }
}

/// Binds positional `args` into a template that refers to them as `args.N`.
pub fn render_input(template: &str, args: &[String]) -> Result<String, ApplicationError> {
    let mut context = Context::new();
    context.insert("args", args);
    Tera::one_off(template, &context, false)
        .map_err(|error| ApplicationError::InvalidTemplate(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_core::domain::message::ThreadAlias;
    use parley_core::domain::ruleset::Ruleset;
    use parley_core::errors::{ApplicationError, ExternalServiceError};
    use parley_core::ports::{AgentEvent, AgentOutput, EventSinks, MemoryAccess};

    use super::{render_input, AgentInvoker, Invocation, AGENT_INPUT_TEMPLATE};
    use crate::events::ChannelSink;
    use crate::test_support::ScriptedExecutor;

    fn args(user: &str, text: &str) -> Vec<String> {
        vec![user.to_owned(), text.to_owned()]
    }

    #[test]
    fn template_binds_user_and_text_without_escaping() {
        let rendered =
            render_input(AGENT_INPUT_TEMPLATE, &args("U1", "is <b> & \"c\" ok?")).expect("render");
        assert_eq!(rendered, "user_id '<@U1>': is <b> & \"c\" ok?");
    }

    #[test]
    fn broken_template_is_reported() {
        let error = render_input("{{ args.0 ", &args("U1", "hi")).expect_err("unterminated tag");
        assert!(matches!(error, ApplicationError::InvalidTemplate(_)));
    }

    #[tokio::test]
    async fn returns_text_and_forwards_run_settings() {
        let executor = ScriptedExecutor::with_texts(&["sure thing"]);
        let invoker = AgentInvoker::new(executor.clone());
        let thread = ThreadAlias("C1:1.0".to_owned());

        let text = invoker
            .invoke(
                Invocation::new(AGENT_INPUT_TEMPLATE, args("U1", "help?"))
                    .with_rulesets(vec![Ruleset::empty("catalog")])
                    .in_thread(thread.clone(), MemoryAccess::ReadWrite)
                    .streaming(true),
            )
            .await
            .expect("invoke");

        assert_eq!(text, "sure thing");
        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].input, "user_id '<@U1>': help?");
        assert_eq!(requests[0].thread, Some(thread));
        assert_eq!(requests[0].memory, MemoryAccess::ReadWrite);
        assert!(requests[0].stream);
        assert_eq!(requests[0].rulesets.len(), 1);
    }

    #[tokio::test]
    async fn error_artifact_becomes_agent_run_error() {
        let executor = Arc::new(ScriptedExecutor::default());
        executor.push(Ok(AgentOutput::Error("model overloaded".to_owned())));
        let invoker = AgentInvoker::new(executor);

        let error = invoker
            .invoke(Invocation::new(AGENT_INPUT_TEMPLATE, args("U1", "hi")))
            .await
            .expect_err("error artifact");
        assert_eq!(error, ApplicationError::AgentRun("model overloaded".to_owned()));
    }

    #[tokio::test]
    async fn executor_failure_propagates() {
        let executor = Arc::new(ScriptedExecutor::default());
        executor.push(Err(ExternalServiceError::new("agent", "connection refused")));
        let invoker = AgentInvoker::new(executor);

        let error = invoker
            .invoke(Invocation::new(AGENT_INPUT_TEMPLATE, args("U1", "hi")))
            .await
            .expect_err("transport failure");
        assert!(matches!(error, ApplicationError::ExternalService(_)));
    }

    #[tokio::test]
    async fn announces_tools_before_the_run_only_when_asked() {
        let executor = ScriptedExecutor::with_texts(&["one", "two"]);
        let invoker = AgentInvoker::new(executor);
        let catalog = parley_core::domain::tool::ToolCatalog::from_config(
            &parley_core::config::ToolsConfig::default(),
        );

        let (sink, mut receiver) = ChannelSink::new();
        let sinks = EventSinks::new(vec![Arc::new(sink)]);
        invoker
            .invoke(
                Invocation::new(AGENT_INPUT_TEMPLATE, args("U1", "hi"))
                    .with_tools(catalog.tools().into_iter().take(1).collect())
                    .announcing_tools(true)
                    .with_sinks(sinks.clone()),
            )
            .await
            .expect("first run");

        assert_eq!(
            receiver.try_recv().ok(),
            Some(AgentEvent::ToolsChosen { tools: vec!["rvKB".to_owned()], stream: false })
        );
        assert_eq!(receiver.try_recv().ok(), Some(AgentEvent::RunCompleted));

        invoker
            .invoke(Invocation::new(AGENT_INPUT_TEMPLATE, args("U1", "hi")).with_sinks(sinks))
            .await
            .expect("second run");
        assert_eq!(receiver.try_recv().ok(), Some(AgentEvent::RunCompleted));
        assert!(receiver.try_recv().is_err());
    }
}
