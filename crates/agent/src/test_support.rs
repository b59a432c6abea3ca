use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_core::errors::ExternalServiceError;
use parley_core::ports::{AgentExecutor, AgentOutput, AgentRunRequest};

/// Replays queued outputs and keeps every request it saw.
#[derive(Default)]
pub struct ScriptedExecutor {
    outputs: Mutex<VecDeque<Result<AgentOutput, ExternalServiceError>>>,
    requests: Mutex<Vec<AgentRunRequest>>,
}

impl ScriptedExecutor {
    pub fn with_texts(texts: &[&str]) -> Arc<Self> {
        let executor = Self::default();
        for text in texts {
            executor.push(Ok(AgentOutput::Text((*text).to_owned())));
        }
        Arc::new(executor)
    }

    pub fn push(&self, output: Result<AgentOutput, ExternalServiceError>) {
        self.outputs.lock().expect("outputs lock").push_back(output);
    }

    pub fn requests(&self) -> Vec<AgentRunRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn run(&self, request: AgentRunRequest) -> Result<AgentOutput, ExternalServiceError> {
        self.requests.lock().expect("requests lock").push(request);
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .unwrap_or_else(|| Err(ExternalServiceError::new("agent", "no scripted output left")))
    }
}
