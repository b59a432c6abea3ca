use parley_core::domain::ruleset::{Rule, Ruleset};
use parley_core::errors::{ApplicationError, ContractViolation};
use serde_json::{json, Value};
use tracing::info;

use crate::invoker::{AgentInvoker, Invocation};

const RELEVANCE_TEMPLATE: &str = "Given the following message: '{{ args.0 }}', is the following response helpful and relevant? Response: {{ args.1 }}";
const SHOULD_RESPOND: &str = "should_respond";

/// Second, independent run that decides whether a candidate reply is worth posting.
#[derive(Clone)]
pub struct RelevanceGate {
    invoker: AgentInvoker,
}

impl RelevanceGate {
    pub fn new(invoker: AgentInvoker) -> Self {
        Self { invoker }
    }

    /// Runs without memory, tools or streaming. The model must answer `{"should_respond": bool}`.
    pub async fn is_relevant(&self, message: &str, response: &str) -> Result<bool, ApplicationError> {
        let payload = self
            .invoker
            .invoke(
                Invocation::new(RELEVANCE_TEMPLATE, vec![message.to_owned(), response.to_owned()])
                    .with_rulesets(vec![relevance_ruleset()]),
            )
            .await?;

        let should_respond = parse_relevance(&payload)?;
        info!(event_name = "pipeline.relevance.decided", should_respond, "relevance decided");
        Ok(should_respond)
    }
}

fn relevance_ruleset() -> Ruleset {
    Ruleset::new(
        "relevance_gate",
        vec![
            Rule::text("You should respond if the response is helpful and relevant to the user"),
            Rule::text(
                "If the message is a question, the response should be shown to the user if the response is helpful and relevant.",
            ),
            Rule::json_schema(relevance_schema()),
        ],
    )
}

fn relevance_schema() -> Value {
    json!({
        "$id": SHOULD_RESPOND,
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            SHOULD_RESPOND: {
                "description": "Boolean value that determines if the given agent response should be sent to the user.",
                "type": "boolean"
            }
        },
        "required": [SHOULD_RESPOND],
        "additionalProperties": false
    })
}

/// Extracts `should_respond` from the gate's output. Never defaults.
pub fn parse_relevance(payload: &str) -> Result<bool, ContractViolation> {
    let value: Value = serde_json::from_str(payload.trim()).map_err(|error| {
        ContractViolation::MalformedRelevancePayload {
            payload: payload.to_owned(),
            reason: error.to_string(),
        }
    })?;

    let Some(object) = value.as_object() else {
        return Err(ContractViolation::MalformedRelevancePayload {
            payload: payload.to_owned(),
            reason: "expected a JSON object".to_owned(),
        });
    };

    match object.get(SHOULD_RESPOND) {
        None => Err(ContractViolation::MissingRelevanceField {
            field: SHOULD_RESPOND,
            payload: payload.to_owned(),
        }),
        Some(field) => field.as_bool().ok_or_else(|| ContractViolation::InvalidRelevanceField {
            field: SHOULD_RESPOND,
            payload: payload.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_core::domain::ruleset::Rule;
    use parley_core::errors::{ApplicationError, ContractViolation};
    use parley_core::ports::{AgentOutput, MemoryAccess};

    use super::{parse_relevance, RelevanceGate};
    use crate::invoker::AgentInvoker;
    use crate::test_support::ScriptedExecutor;

    #[test]
    fn reads_the_boolean_field() {
        assert_eq!(parse_relevance(r#"{"should_respond": true}"#), Ok(true));
        assert_eq!(parse_relevance(" {\"should_respond\": false}\n"), Ok(false));
    }

    #[test]
    fn missing_field_is_a_contract_violation() {
        assert!(matches!(
            parse_relevance(r#"{"respond": true}"#),
            Err(ContractViolation::MissingRelevanceField { field: "should_respond", .. })
        ));
    }

    #[test]
    fn wrong_type_is_not_coerced() {
        assert!(matches!(
            parse_relevance(r#"{"should_respond": "yes"}"#),
            Err(ContractViolation::InvalidRelevanceField { .. })
        ));
        assert!(matches!(
            parse_relevance(r#"{"should_respond": 1}"#),
            Err(ContractViolation::InvalidRelevanceField { .. })
        ));
    }

    #[test]
    fn non_object_payloads_are_malformed() {
        assert!(matches!(
            parse_relevance("true"),
            Err(ContractViolation::MalformedRelevancePayload { .. })
        ));
        assert!(matches!(
            parse_relevance("Sure, respond!"),
            Err(ContractViolation::MalformedRelevancePayload { .. })
        ));
    }

    #[tokio::test]
    async fn gate_runs_without_memory_or_streaming() {
        let executor = ScriptedExecutor::with_texts(&[r#"{"should_respond": true}"#]);
        let gate = RelevanceGate::new(AgentInvoker::new(executor.clone()));

        assert!(gate.is_relevant("is prod down?", "No, all green.").await.expect("gate"));

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.memory, MemoryAccess::Disabled);
        assert!(request.thread.is_none());
        assert!(!request.stream);
        assert!(request.tools.is_empty());
        assert!(request.input.contains("'is prod down?'"));
        assert!(request.input.ends_with("Response: No, all green."));
        assert!(matches!(request.rulesets[0].rules[2], Rule::JsonSchema { .. }));
    }

    #[tokio::test]
    async fn error_artifact_fails_the_gate() {
        let executor = Arc::new(ScriptedExecutor::default());
        executor.push(Ok(AgentOutput::Error("schema validation failed".to_owned())));
        let gate = RelevanceGate::new(AgentInvoker::new(executor));

        let error = gate.is_relevant("hi", "hello").await.expect_err("error artifact");
        assert_eq!(error, ApplicationError::AgentRun("schema validation failed".to_owned()));
    }

    #[tokio::test]
    async fn malformed_gate_output_fails_loudly() {
        let executor = ScriptedExecutor::with_texts(&[r#"{}"#]);
        let gate = RelevanceGate::new(AgentInvoker::new(executor));

        let error = gate.is_relevant("hi", "hello").await.expect_err("missing field");
        assert!(matches!(error, ApplicationError::Contract(_)));
    }
}
