use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_agent::{
    AgentInvoker, AgentRuntime, ChannelSink, ContextOutcome, ContextRecorder, PipelineOutcome,
    RulesetResolver, RuntimeSettings, ToolSelector,
};
use parley_core::config::{FeatureFlags, ToolsConfig, DEFAULT_RULESET_CATALOG};
use parley_core::domain::message::{ChatMessage, ThreadAlias};
use parley_core::domain::ruleset::{Rule, Ruleset};
use parley_core::errors::{ApplicationError, ExternalServiceError};
use parley_core::ports::{
    AgentEvent, AgentExecutor, AgentOutput, AgentRunRequest, ConversationMemory, EventSinks,
};
use parley_db::repositories::memory::{InMemoryConversationMemory, InMemoryRulesetStore};

#[derive(Default)]
struct QueuedExecutor {
    outputs: Mutex<VecDeque<AgentOutput>>,
    requests: Mutex<Vec<AgentRunRequest>>,
}

impl QueuedExecutor {
    fn new(texts: &[&str]) -> Arc<Self> {
        let executor = Self::default();
        executor
            .outputs
            .lock()
            .expect("outputs lock")
            .extend(texts.iter().map(|text| AgentOutput::Text((*text).to_owned())));
        Arc::new(executor)
    }

    fn requests(&self) -> Vec<AgentRunRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl AgentExecutor for QueuedExecutor {
    async fn run(&self, request: AgentRunRequest) -> Result<AgentOutput, ExternalServiceError> {
        self.requests.lock().expect("requests lock").push(request);
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .ok_or_else(|| ExternalServiceError::new("agent", "no queued output"))
    }
}

fn reference_store() -> InMemoryRulesetStore {
    let mut rulesets: Vec<Ruleset> = DEFAULT_RULESET_CATALOG
        .iter()
        .enumerate()
        .map(|(index, id)| {
            Ruleset::new(format!("catalog-{index}"), vec![Rule::text(format!("rule {index}"))])
                .with_id(*id)
        })
        .collect();
    rulesets.push(Ruleset::empty("UPARLEY").with_meta("type", "bot"));
    InMemoryRulesetStore::with_rulesets(rulesets)
}

fn catalog_ids() -> Vec<String> {
    DEFAULT_RULESET_CATALOG.iter().map(|id| id.to_string()).collect()
}

fn message(text: &str) -> ChatMessage {
    ChatMessage {
        text: text.to_owned(),
        user_id: "U777".to_owned(),
        channel_id: "C42".to_owned(),
        thread: ThreadAlias::for_slack_thread("C42", "1712345678.000200"),
        direct: false,
    }
}

#[tokio::test]
async fn mention_of_unknown_identity_records_context_and_leaves_catalog_untouched() {
    let store: Arc<InMemoryRulesetStore> = Arc::new(reference_store());
    let memory = Arc::new(InMemoryConversationMemory::default());
    let msg = message("<@U123> can you help?");

    let recorder = ContextRecorder::new(store.clone(), memory.clone());
    let outcome = recorder
        .maybe_record_context(&msg.text, &msg.thread, &msg.user_id)
        .await
        .expect("record context");
    assert_eq!(outcome, ContextOutcome::Recorded);

    let runs = memory.runs(&msg.thread).await.expect("runs");
    assert_eq!(runs.len(), 1);
    assert!(runs[0].output.is_empty());
    assert!(runs[0].input.contains("can you help?"));
    assert!(runs[0].input.contains("U777"));

    let resolver = RulesetResolver::new(store, catalog_ids());
    let rulesets = resolver.resolve(&[("user_id", "U123")], false).await.expect("resolve");
    let ids: Vec<_> = rulesets
        .iter()
        .map(|ruleset| ruleset.id.as_ref().map(|id| id.0.as_str()).unwrap_or_default())
        .collect();
    assert_eq!(ids, DEFAULT_RULESET_CATALOG.to_vec());
}

#[tokio::test]
async fn dynamic_selection_keeps_the_model_order() {
    let executor = QueuedExecutor::new(&["quote_knowledge_base_tool, slack_tool"]);
    let selector = ToolSelector::new(AgentInvoker::new(executor), ToolsConfig::default());

    let tools = selector
        .select("what did we quote?", &message("").thread, true)
        .await
        .expect("select");

    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["quotes", "slack_tool"]);
}

#[tokio::test]
async fn bot_ruleset_opting_into_dynamic_tools_drives_selection_and_events() {
    let store = reference_store();
    store.insert(Ruleset::empty("C42").with_meta("dynamic_tools", true)).await;
    let executor = QueuedExecutor::new(&["github_tool", "Merged yesterday."]);
    let features = FeatureFlags { dynamic_rulesets: true, stream: true, ..FeatureFlags::default() };
    let runtime = AgentRuntime::new(
        executor.clone(),
        Arc::new(store),
        Arc::new(InMemoryConversationMemory::default()),
        RuntimeSettings { features, default_catalog: catalog_ids(), tools: ToolsConfig::default() },
    );
    let (sink, mut events) = ChannelSink::new();

    let outcome = runtime
        .handle_message(
            &message("<@UPARLEY> was the release PR merged?"),
            EventSinks::new(vec![Arc::new(sink)]),
        )
        .await
        .expect("pipeline");

    assert_eq!(outcome, PipelineOutcome::Reply("Merged yesterday.".to_owned()));
    assert_eq!(
        events.try_recv().ok(),
        Some(AgentEvent::ToolsChosen { tools: vec!["github_tool".to_owned()], stream: true })
    );

    let requests = executor.requests();
    assert_eq!(requests.len(), 2);
    let main_run = &requests[1];
    let names: Vec<_> = main_run.rulesets.iter().map(|ruleset| ruleset.name.as_str()).collect();
    assert_eq!(&names[..2], &["UPARLEY", "C42"]);
    assert_eq!(main_run.rulesets.len(), 7);
    assert!(main_run.stream);
}

#[tokio::test]
async fn missing_catalog_ruleset_aborts_the_reply() {
    let executor = QueuedExecutor::new(&["never used"]);
    let store = InMemoryRulesetStore::with_rulesets(vec![
        Ruleset::empty("UPARLEY").with_meta("type", "bot"),
    ]);
    let runtime = AgentRuntime::new(
        executor.clone(),
        Arc::new(store),
        Arc::new(InMemoryConversationMemory::default()),
        RuntimeSettings {
            features: FeatureFlags::default(),
            default_catalog: catalog_ids(),
            tools: ToolsConfig::default(),
        },
    );

    let error = runtime
        .handle_message(&message("<@UPARLEY> hello"), EventSinks::none())
        .await
        .expect_err("catalog lookup should fail");

    assert_eq!(error, ApplicationError::RulesetNotFound(DEFAULT_RULESET_CATALOG[0].to_owned()));
    assert!(executor.requests().is_empty());
}
