//! Slack host for the parley agent pipeline.
//!
//! - **Socket Mode** (`socket`) - connect/pump/ack loop with reconnect backoff. The wire
//!   transport is pluggable; the default is a no-op.
//! - **Events** (`events`) - envelope model and a dispatcher that routes messages into
//!   [`parley_agent::AgentRuntime`].
//! - **Block Kit** (`blocks`) - reply message builders.
//!
//! ```text
//! Slack frame → SlackEnvelope → EventDispatcher → MessageHandler → AgentRuntime
//!                                                       ↓
//!                          SocketTransport::post_message ← Block Kit reply
//! ```

pub mod blocks;
pub mod events;
pub mod socket;
