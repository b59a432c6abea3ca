use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parley_core::config::AgentServiceConfig;
use parley_core::domain::conversation::ConversationRun;
use parley_core::domain::message::ThreadAlias;
use parley_core::domain::ruleset::Ruleset;
use parley_core::domain::tool::Tool;
use parley_core::errors::ExternalServiceError;
use parley_core::ports::{
    AgentEvent, AgentExecutor, AgentOutput, AgentRunRequest, ConversationMemory, EventSinks,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SERVICE: &str = "agent";

#[derive(Serialize)]
struct RunBody<'a> {
    model: &'a str,
    input: &'a str,
    rulesets: &'a [Ruleset],
    tools: &'a [Tool],
    thread_alias: Option<&'a ThreadAlias>,
    history: Vec<HistoryEntry<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    input: &'a str,
    output: &'a str,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
enum StreamFrame {
    Chunk(String),
    Text(String),
    Error(String),
}

/// Client for the agent execution service. Owns thread history: it loads the
/// thread's runs before a call and appends the new run after a read-write one.
#[derive(Clone)]
pub struct HttpAgentExecutor {
    client: Client,
    runs_url: String,
    model: String,
    api_key: Option<SecretString>,
    memory: Arc<dyn ConversationMemory>,
}

impl HttpAgentExecutor {
    pub fn new(
        config: &AgentServiceConfig,
        memory: Arc<dyn ConversationMemory>,
    ) -> Result<Self, ExternalServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ExternalServiceError::new(SERVICE, error.to_string()))?;

        Ok(Self {
            client,
            runs_url: format!("{}/runs", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            memory,
        })
    }

    async fn history(
        &self,
        request: &AgentRunRequest,
    ) -> Result<Vec<ConversationRun>, ExternalServiceError> {
        match &request.thread {
            Some(thread) if request.memory.reads() => self.memory.runs(thread).await,
            _ => Ok(Vec::new()),
        }
    }

    async fn post(
        &self,
        request: &AgentRunRequest,
        history: &[ConversationRun],
    ) -> Result<reqwest::Response, ExternalServiceError> {
        let body = RunBody {
            model: &self.model,
            input: &request.input,
            rulesets: &request.rulesets,
            tools: &request.tools,
            thread_alias: request.thread.as_ref(),
            history: history
                .iter()
                .map(|run| HistoryEntry { input: &run.input, output: &run.output })
                .collect(),
            stream: request.stream,
        };

        let mut builder = self.client.post(&self.runs_url).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ExternalServiceError::new(
                SERVICE,
                format!("agent service returned {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl AgentExecutor for HttpAgentExecutor {
    async fn run(&self, request: AgentRunRequest) -> Result<AgentOutput, ExternalServiceError> {
        let history = self.history(&request).await?;
        let response = self.post(&request, &history).await?;

        let output = if request.stream {
            read_stream(response, &request.sinks).await?
        } else {
            response.json::<AgentOutput>().await.map_err(|error| {
                ExternalServiceError::new(SERVICE, format!("undecodable run result: {error}"))
            })?
        };

        if let (AgentOutput::Text(text), Some(thread)) = (&output, &request.thread) {
            if request.memory.writes() {
                self.memory
                    .append_run(thread, ConversationRun::new(request.input.clone(), text.clone()))
                    .await?;
            }
        }

        debug!(
            event_name = "agent.http.run_finished",
            thread_id = request.thread.as_ref().map(ThreadAlias::as_str).unwrap_or("none"),
            history = history.len(),
            stream = request.stream,
            failed = matches!(output, AgentOutput::Error(_)),
            "agent service run finished"
        );
        Ok(output)
    }
}

/// Reads newline-delimited frames, publishing chunks until a terminal frame arrives.
async fn read_stream(
    mut response: reqwest::Response,
    sinks: &EventSinks,
) -> Result<AgentOutput, ExternalServiceError> {
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = response.chunk().await.map_err(transport_error)?;
        let finished = chunk.is_none();
        if let Some(bytes) = chunk {
            buffer.extend_from_slice(&bytes);
        } else if !buffer.is_empty() {
            buffer.push(b'\n');
        }

        while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            if let Some(output) = handle_frame(&line, sinks)? {
                return Ok(output);
            }
        }

        if finished {
            warn!(event_name = "agent.http.stream_truncated", "stream ended without a result");
            return Err(ExternalServiceError::new(SERVICE, "stream ended without a result frame"));
        }
    }
}

fn handle_frame(line: &[u8], sinks: &EventSinks) -> Result<Option<AgentOutput>, ExternalServiceError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let frame: StreamFrame = serde_json::from_str(line).map_err(|error| {
        ExternalServiceError::new(SERVICE, format!("undecodable stream frame: {error}"))
    })?;
    Ok(match frame {
        StreamFrame::Chunk(text) => {
            sinks.publish(&AgentEvent::OutputChunk { text });
            None
        }
        StreamFrame::Text(text) => Some(AgentOutput::Text(text)),
        StreamFrame::Error(message) => Some(AgentOutput::Error(message)),
    })
}

fn transport_error(error: reqwest::Error) -> ExternalServiceError {
    ExternalServiceError::new(SERVICE, error.to_string())
}
