use parley_core::ports::{AgentEvent, EventSink};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Forwards events into a tokio channel, e.g. for a progress UI or a test.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<AgentEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &AgentEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(event_name = "pipeline.events.receiver_dropped", "event receiver dropped");
        }
    }
}

/// Writes every event to the structured log.
#[derive(Clone, Debug)]
pub struct TracingSink {
    correlation_id: String,
}

impl TracingSink {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }
}

impl EventSink for TracingSink {
    fn publish(&self, event: &AgentEvent) {
        match event {
            AgentEvent::ToolsChosen { tools, stream } => info!(
                event_name = "pipeline.events.tools_chosen",
                correlation_id = %self.correlation_id,
                tools = ?tools,
                stream,
                "agent tools chosen"
            ),
            AgentEvent::OutputChunk { text } => debug!(
                event_name = "pipeline.events.output_chunk",
                correlation_id = %self.correlation_id,
                chunk_len = text.len(),
                "agent output chunk"
            ),
            AgentEvent::RunCompleted => debug!(
                event_name = "pipeline.events.run_completed",
                correlation_id = %self.correlation_id,
                "agent run completed"
            ),
        }
    }
}
