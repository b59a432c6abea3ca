use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRun {
    pub id: Uuid,
    pub input: String,
    pub output: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationRun {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), input: input.into(), output: output.into(), created_at: Utc::now() }
    }

    /// A run that only registers side-channel context. The input keeps an explicit
    /// "do not respond" framing and the output stays empty so consumers of the
    /// memory log never treat it as an unanswered request.
    pub fn context_only(user_id: &str, message: &str) -> Self {
        Self::new(
            format!(
                "Do not respond. Only use this message for future context. Message: 'user {user_id}: {message}'"
            ),
            "",
        )
    }

    pub fn is_context_only(&self) -> bool {
        self.output.is_empty() && self.input.starts_with("Do not respond.")
    }
}
