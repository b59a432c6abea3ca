use std::fmt;

use serde::{Deserialize, Serialize};

/// Scopes conversation memory to one conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadAlias(pub String);

impl ThreadAlias {
    pub fn for_slack_thread(channel_id: &str, thread_ts: &str) -> Self {
        Self(format!("{channel_id}:{thread_ts}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An incoming chat message. Immutable once received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    pub thread: ThreadAlias,
    /// Direct-message channels are always addressed to the bot.
    pub direct: bool,
}
