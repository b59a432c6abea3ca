use std::sync::Arc;

use parley_core::domain::conversation::ConversationRun;
use parley_core::domain::message::ThreadAlias;
use parley_core::errors::ApplicationError;
use parley_core::mentions::mentions_in_order;
use parley_core::ports::{ConversationMemory, RulesetStore};
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextOutcome {
    Recorded,
    /// The message mentions a bot, so the normal reply path already covers it.
    SkippedBotMention { bot_id: String },
}

/// Folds messages that are not addressed to the bot into thread memory.
#[derive(Clone)]
pub struct ContextRecorder {
    rulesets: Arc<dyn RulesetStore>,
    memory: Arc<dyn ConversationMemory>,
}

impl ContextRecorder {
    pub fn new(rulesets: Arc<dyn RulesetStore>, memory: Arc<dyn ConversationMemory>) -> Self {
        Self { rulesets, memory }
    }

    /// First mentioned identity whose ruleset is bot-typed. Unknown identities are not bots.
    pub async fn find_bot_mention(&self, text: &str) -> Result<Option<String>, ApplicationError> {
        for identity in mentions_in_order(text) {
            let is_bot = self
                .rulesets
                .find_by_name(&identity)
                .await?
                .map(|ruleset| ruleset.is_bot())
                .unwrap_or(false);
            if is_bot {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    pub async fn maybe_record_context(
        &self,
        text: &str,
        thread: &ThreadAlias,
        user_id: &str,
    ) -> Result<ContextOutcome, ApplicationError> {
        if let Some(bot_id) = self.find_bot_mention(text).await? {
            debug!(
                event_name = "pipeline.memory.context_skipped",
                thread_id = %thread,
                bot_id = %bot_id,
                "message mentions a bot, not recording context"
            );
            return Ok(ContextOutcome::SkippedBotMention { bot_id });
        }

        self.record_context(text, thread, user_id).await?;
        Ok(ContextOutcome::Recorded)
    }

    /// Appends the context-only run. Callers must already know no bot was mentioned.
    pub async fn record_context(
        &self,
        text: &str,
        thread: &ThreadAlias,
        user_id: &str,
    ) -> Result<(), ApplicationError> {
        self.memory.append_run(thread, ConversationRun::context_only(user_id, text)).await?;
        info!(
            event_name = "pipeline.memory.context_recorded",
            thread_id = %thread,
            user_id,
            "recorded context message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_core::domain::message::ThreadAlias;
    use parley_core::domain::ruleset::Ruleset;
    use parley_core::ports::ConversationMemory;
    use parley_db::repositories::memory::{InMemoryConversationMemory, InMemoryRulesetStore};

    use super::{ContextOutcome, ContextRecorder};

    fn recorder(rulesets: Vec<Ruleset>) -> (ContextRecorder, Arc<InMemoryConversationMemory>) {
        let memory = Arc::new(InMemoryConversationMemory::default());
        let recorder = ContextRecorder::new(
            Arc::new(InMemoryRulesetStore::with_rulesets(rulesets)),
            memory.clone(),
        );
        (recorder, memory)
    }

    fn thread() -> ThreadAlias {
        ThreadAlias::for_slack_thread("C1", "1700000000.000100")
    }

    fn recorder_with_bot() -> (ContextRecorder, Arc<InMemoryConversationMemory>) {
        recorder(vec![
            Ruleset::empty("UHUMAN").with_meta("type", "person"),
            Ruleset::empty("UBOT1").with_meta("type", "bot"),
        ])
    }

    #[tokio::test]
    async fn bot_mention_skips_memory_write() {
        let (recorder, memory) = recorder_with_bot();

        let outcome = recorder
            .maybe_record_context("<@UHUMAN> can you ask <@UBOT1>?", &thread(), "U9")
            .await
            .expect("record");

        assert_eq!(outcome, ContextOutcome::SkippedBotMention { bot_id: "UBOT1".to_owned() });
        assert!(memory.runs(&thread()).await.expect("runs").is_empty());
    }

    #[tokio::test]
    async fn non_bot_mentions_are_recorded() {
        let (recorder, memory) = recorder_with_bot();

        let outcome = recorder
            .maybe_record_context("<@UHUMAN> lunch?", &thread(), "U9")
            .await
            .expect("record");

        assert_eq!(outcome, ContextOutcome::Recorded);
        assert_eq!(memory.runs(&thread()).await.expect("runs").len(), 1);
    }

    #[tokio::test]
    async fn unknown_mentions_fail_open_and_record_once() {
        let (recorder, memory) = recorder(Vec::new());

        let outcome = recorder
            .maybe_record_context("<@U123> can you help?", &thread(), "U77")
            .await
            .expect("record");

        assert_eq!(outcome, ContextOutcome::Recorded);
        let runs = memory.runs(&thread()).await.expect("runs");
        assert_eq!(runs.len(), 1);
        assert!(runs[0].output.is_empty());
        assert!(runs[0].input.contains("<@U123> can you help?"));
        assert!(runs[0].input.contains("U77"));
        assert!(runs[0].input.starts_with("Do not respond."));
    }

    #[tokio::test]
    async fn bot_anywhere_in_the_mentions_wins() {
        let (recorder, _) = recorder_with_bot();

        let found = recorder
            .find_bot_mention("<@U1> <@U2> <@UBOT1> <@U3>")
            .await
            .expect("lookup");
        assert_eq!(found.as_deref(), Some("UBOT1"));
        assert_eq!(recorder.find_bot_mention("no mentions").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn memory_is_scoped_per_thread() {
        let (recorder, memory) = recorder(Vec::new());
        let other = ThreadAlias::for_slack_thread("C2", "1.0");

        recorder.maybe_record_context("first", &thread(), "U1").await.expect("record");
        recorder.maybe_record_context("second", &other, "U1").await.expect("record");

        assert_eq!(memory.runs(&thread()).await.expect("runs").len(), 1);
        assert_eq!(memory.runs(&other).await.expect("runs").len(), 1);
    }

    #[tokio::test]
    async fn record_context_appends_without_rechecking_mentions() {
        let (recorder, memory) = recorder_with_bot();

        recorder.record_context("<@UHUMAN> lunch?", &thread(), "U9").await.expect("record");

        let runs = memory.runs(&thread()).await.expect("runs");
        assert_eq!(runs.len(), 1);
        assert!(runs[0].is_context_only());
    }
}
