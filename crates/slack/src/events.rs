use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parley_agent::{AgentRuntime, PipelineOutcome, TracingSink};
use parley_core::domain::message::{ChatMessage, ThreadAlias};
use parley_core::ports::EventSinks;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::blocks::{agent_reply_message, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Debug, Error)]
pub enum EnvelopeParseError {
    #[error("socket frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("socket frame has no envelope_id")]
    MissingEnvelopeId,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    payload: Option<RawPayload>,
}

#[derive(Deserialize)]
struct RawPayload {
    event: Option<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    subtype: Option<String>,
    channel: Option<String>,
    channel_type: Option<String>,
    ts: Option<String>,
    thread_ts: Option<String>,
    user: Option<String>,
    text: Option<String>,
    bot_id: Option<String>,
}

impl SlackEnvelope {
    /// Parses one Socket Mode frame. Control frames (`hello`, `disconnect`) carry no
    /// envelope and yield `None`.
    pub fn from_socket_frame(frame: &str) -> Result<Option<Self>, EnvelopeParseError> {
        let raw: RawFrame = serde_json::from_str(frame)?;
        if raw.frame_type != "events_api" {
            return Ok(None);
        }
        let envelope_id = raw.envelope_id.ok_or(EnvelopeParseError::MissingEnvelopeId)?;

        let event = match raw.payload.and_then(|payload| payload.event) {
            Some(event) => SlackEvent::from_raw(event),
            None => SlackEvent::Unsupported { event_type: "missing".to_owned() },
        };
        Ok(Some(Self { envelope_id, event }))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    fn from_raw(raw: RawEvent) -> Self {
        // Slack also sends `app_mention` for a channel mention it already delivered as
        // `message`; only `message` drives the pipeline so one mention gets one run.
        let is_message = raw.event_type == "message";
        // Edits, deletions and joins arrive as message subtypes; only `bot_message` is kept
        // so the handler can drop it explicitly.
        let plain = matches!(raw.subtype.as_deref(), None | Some("bot_message"));
        match (is_message && plain, raw.channel, raw.ts) {
            (true, Some(channel_id), Some(ts)) => Self::Message(MessageEvent {
                channel_id,
                channel_type: raw.channel_type,
                ts,
                thread_ts: raw.thread_ts,
                user_id: raw.user.unwrap_or_default(),
                text: raw.text.unwrap_or_default(),
                bot_id: raw.bot_id,
            }),
            _ => Self::Unsupported {
                event_type: match raw.subtype {
                    Some(subtype) => format!("{}.{subtype}", raw.event_type),
                    None => raw.event_type,
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub channel_type: Option<String>,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub user_id: String,
    pub text: String,
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// Top-level messages start their own thread.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn thread_alias(&self) -> ThreadAlias {
        ThreadAlias::for_slack_thread(&self.channel_id, self.reply_thread_ts())
    }

    pub fn is_direct(&self) -> bool {
        self.channel_type.as_deref() == Some("im")
    }

    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some()
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            text: self.text.clone(),
            user_id: self.user_id.clone(),
            channel_id: self.channel_id.clone(),
            thread: self.thread_alias(),
            direct: self.is_direct(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// A reply addressed to a channel thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub thread_ts: String,
    pub message: MessageTemplate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(OutboundMessage),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn agent_dispatcher(runtime: AgentRuntime) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(AgentMessageService::new(runtime)));
    dispatcher
}

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct MessageHandler<S> {
    service: S,
}

impl<S> MessageHandler<S>
where
    S: MessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.is_from_bot() || event.text.trim().is_empty() {
            debug!(
                event_name = "ingress.slack.message_skipped",
                correlation_id = %ctx.correlation_id,
                thread_id = %event.thread_alias(),
                from_bot = event.is_from_bot(),
                "skipping bot or empty message"
            );
            return Ok(HandlerResult::Ignored);
        }

        let message = self.service.handle_message(event, ctx).await?;
        Ok(match message {
            Some(message) => HandlerResult::Responded(OutboundMessage {
                channel_id: event.channel_id.clone(),
                thread_ts: event.reply_thread_ts().to_owned(),
                message,
            }),
            None => HandlerResult::Processed,
        })
    }
}

/// Runs every message through the agent pipeline.
pub struct AgentMessageService {
    runtime: AgentRuntime,
}

impl AgentMessageService {
    pub fn new(runtime: AgentRuntime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl MessageService for AgentMessageService {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        let message = event.to_chat_message();
        let sinks = EventSinks::new(vec![Arc::new(TracingSink::new(ctx.correlation_id.clone()))]);

        match self.runtime.handle_message(&message, sinks).await {
            Ok(PipelineOutcome::Reply(text)) => Ok(Some(agent_reply_message(&text))),
            Ok(outcome) => {
                debug!(
                    event_name = "ingress.slack.no_reply",
                    correlation_id = %ctx.correlation_id,
                    thread_id = %message.thread,
                    outcome = ?outcome,
                    "pipeline finished without a reply"
                );
                Ok(None)
            }
            Err(error) => {
                let class = error.class();
                let interface = error.into_interface(ctx.correlation_id.clone());
                warn!(
                    event_name = "ingress.slack.pipeline_failed",
                    correlation_id = %ctx.correlation_id,
                    thread_id = %message.thread,
                    error_class = class,
                    error = %interface,
                    "pipeline failed; no reply posted"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use parley_agent::{AgentRuntime, RuntimeSettings};
    use parley_core::config::{FeatureFlags, ToolsConfig};
    use parley_core::domain::message::ThreadAlias;
    use parley_core::domain::ruleset::Ruleset;
    use parley_core::errors::ExternalServiceError;
    use parley_core::ports::{AgentExecutor, AgentOutput, AgentRunRequest, ConversationMemory};
    use parley_db::repositories::memory::{InMemoryConversationMemory, InMemoryRulesetStore};

    use super::{
        agent_dispatcher, EventContext, EventDispatcher, HandlerResult, MessageEvent,
        SlackEnvelope, SlackEvent,
    };
    use crate::blocks::agent_reply_message;

    #[derive(Default)]
    struct QueuedExecutor {
        outputs: Mutex<VecDeque<Result<AgentOutput, ExternalServiceError>>>,
        calls: Mutex<usize>,
    }

    impl QueuedExecutor {
        fn with(outputs: Vec<Result<AgentOutput, ExternalServiceError>>) -> Arc<Self> {
            Arc::new(Self { outputs: Mutex::new(outputs.into()), calls: Mutex::new(0) })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl AgentExecutor for QueuedExecutor {
        async fn run(&self, _request: AgentRunRequest) -> Result<AgentOutput, ExternalServiceError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.outputs
                .lock()
                .expect("outputs lock")
                .pop_front()
                .unwrap_or_else(|| Err(ExternalServiceError::new("agent", "no queued output")))
        }
    }

    fn runtime(
        executor: Arc<QueuedExecutor>,
    ) -> (AgentRuntime, Arc<InMemoryConversationMemory>) {
        let store = InMemoryRulesetStore::with_rulesets(vec![
            Ruleset::empty("catalog").with_id("rs-1"),
            Ruleset::empty("UBOT").with_meta("type", "bot"),
        ]);
        let memory = Arc::new(InMemoryConversationMemory::default());
        let runtime = AgentRuntime::new(
            executor,
            Arc::new(store),
            memory.clone(),
            RuntimeSettings {
                features: FeatureFlags::default(),
                default_catalog: vec!["rs-1".to_owned()],
                tools: ToolsConfig::default(),
            },
        );
        (runtime, memory)
    }

    fn message_event(text: &str) -> MessageEvent {
        MessageEvent {
            channel_id: "C1".to_owned(),
            channel_type: Some("channel".to_owned()),
            ts: "1730000000.2000".to_owned(),
            thread_ts: Some("1730000000.1000".to_owned()),
            user_id: "U2".to_owned(),
            text: text.to_owned(),
            bot_id: None,
        }
    }

    fn envelope(event: MessageEvent) -> SlackEnvelope {
        SlackEnvelope { envelope_id: "env-1".to_owned(), event: SlackEvent::Message(event) }
    }

    #[test]
    fn thread_alias_prefers_thread_ts_over_ts() {
        let threaded = message_event("hi");
        assert_eq!(threaded.thread_alias().as_str(), "C1:1730000000.1000");

        let top_level = MessageEvent { thread_ts: None, ..message_event("hi") };
        assert_eq!(top_level.thread_alias().as_str(), "C1:1730000000.2000");
        assert_eq!(top_level.reply_thread_ts(), "1730000000.2000");
    }

    #[test]
    fn im_channels_are_direct() {
        let dm = MessageEvent { channel_type: Some("im".to_owned()), ..message_event("hi") };
        assert!(dm.to_chat_message().direct);
        assert!(!message_event("hi").to_chat_message().direct);
    }

    #[test]
    fn parses_events_api_message_frames() {
        let frame = r#"{
            "envelope_id": "env-9",
            "type": "events_api",
            "payload": {"event": {
                "type": "message", "channel": "C9", "channel_type": "im",
                "user": "U9", "text": "hello", "ts": "1.5"
            }}
        }"#;

        let envelope = SlackEnvelope::from_socket_frame(frame).expect("parse").expect("envelope");
        assert_eq!(envelope.envelope_id, "env-9");
        let SlackEvent::Message(event) = envelope.event else {
            panic!("expected a message event");
        };
        assert_eq!(event.thread_alias().as_str(), "C9:1.5");
        assert!(event.is_direct());
    }

    #[test]
    fn control_frames_and_subtypes_are_not_messages() {
        assert_eq!(SlackEnvelope::from_socket_frame(r#"{"type":"hello"}"#).expect("hello"), None);

        let edited = r#"{"envelope_id":"env-3","type":"events_api","payload":{"event":
            {"type":"message","subtype":"message_changed","channel":"C1","ts":"2.0"}}}"#;
        let envelope = SlackEnvelope::from_socket_frame(edited).expect("parse").expect("envelope");
        assert_eq!(
            envelope.event,
            SlackEvent::Unsupported { event_type: "message.message_changed".to_owned() }
        );

        assert!(SlackEnvelope::from_socket_frame(r#"{"type":"events_api"}"#).is_err());
        assert!(SlackEnvelope::from_socket_frame("not json").is_err());
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();

        let result = dispatcher
            .dispatch(&envelope(message_event("hello")), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn bot_mention_replies_into_the_thread() {
        let executor = QueuedExecutor::with(vec![Ok(AgentOutput::Text("All green.".to_owned()))]);
        let (runtime, _) = runtime(executor);
        let dispatcher = agent_dispatcher(runtime);
        assert_eq!(dispatcher.handler_count(), 1);

        let result = dispatcher
            .dispatch(&envelope(message_event("<@UBOT> is prod ok?")), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(outbound) = result else {
            panic!("expected a reply, got {result:?}");
        };
        assert_eq!(outbound.channel_id, "C1");
        assert_eq!(outbound.thread_ts, "1730000000.1000");
        assert_eq!(outbound.message, agent_reply_message("All green."));
    }

    #[tokio::test]
    async fn unaddressed_chatter_is_processed_silently() {
        let executor = QueuedExecutor::with(Vec::new());
        let (runtime, memory) = runtime(executor.clone());
        let event = message_event("lunch anyone?");

        let result = agent_dispatcher(runtime)
            .dispatch(&envelope(event.clone()), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(executor.calls(), 0);
        assert_eq!(memory.runs(&event.thread_alias()).await.expect("runs").len(), 1);
    }

    #[tokio::test]
    async fn bot_authored_and_empty_messages_never_reach_the_pipeline() {
        let executor = QueuedExecutor::with(Vec::new());
        let (runtime, _) = runtime(executor.clone());
        let dispatcher = agent_dispatcher(runtime);

        let from_bot = MessageEvent { bot_id: Some("B1".to_owned()), ..message_event("<@UBOT> hi") };
        let blank = message_event("   ");

        for event in [from_bot, blank] {
            let result = dispatcher
                .dispatch(&envelope(event), &EventContext::default())
                .await
                .expect("dispatch");
            assert_eq!(result, HandlerResult::Ignored);
        }
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn app_mention_duplicate_of_a_message_is_not_answered_twice() {
        let executor = QueuedExecutor::with(vec![
            Ok(AgentOutput::Text("hi back".to_owned())),
            Ok(AgentOutput::Text("hi again".to_owned())),
        ]);
        let (runtime, memory) = runtime(executor.clone());
        let dispatcher = agent_dispatcher(runtime);

        let frame = |event_type: &str, envelope_id: &str| {
            format!(
                r#"{{"envelope_id":"{envelope_id}","type":"events_api","payload":{{"event":
                {{"type":"{event_type}","channel":"C1","channel_type":"channel","user":"U2",
                "text":"<@UBOT> hi","ts":"5.0"}}}}}}"#
            )
        };

        let mut replies = 0;
        for (event_type, envelope_id) in [("message", "env-a"), ("app_mention", "env-b")] {
            let envelope = SlackEnvelope::from_socket_frame(&frame(event_type, envelope_id))
                .expect("parse")
                .expect("envelope");
            let result =
                dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");
            if matches!(result, HandlerResult::Responded(_)) {
                replies += 1;
            }
        }

        assert_eq!(replies, 1);
        assert_eq!(executor.calls(), 1);
        let alias = ThreadAlias::for_slack_thread("C1", "5.0");
        assert!(memory.runs(&alias).await.expect("runs").is_empty());
    }

    #[test]
    fn app_mention_frames_are_unsupported() {
        let frame = r#"{"envelope_id":"env-4","type":"events_api","payload":{"event":
            {"type":"app_mention","channel":"C1","user":"U2","text":"<@UBOT> hi","ts":"5.0"}}}"#;

        let envelope = SlackEnvelope::from_socket_frame(frame).expect("parse").expect("envelope");
        assert_eq!(envelope.event, SlackEvent::Unsupported { event_type: "app_mention".to_owned() });
    }

    #[tokio::test]
    async fn pipeline_failure_posts_nothing() {
        let executor = QueuedExecutor::with(vec![Ok(AgentOutput::Error("rate limited".to_owned()))]);
        let (runtime, _) = runtime(executor);

        let result = agent_dispatcher(runtime)
            .dispatch(&envelope(message_event("<@UBOT> summarize")), &EventContext::default())
            .await
            .expect("failures are absorbed by the handler");

        assert_eq!(result, HandlerResult::Processed);
    }
}
