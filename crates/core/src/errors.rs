use thiserror::Error;

/// Model-produced output that broke a structural contract. Never coerced.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("tool selection named `{token}`, which is not in the catalog (known: {known})")]
    UnknownTool { token: String, known: String },
    #[error("relevance payload is missing `{field}`: {payload}")]
    MissingRelevanceField { field: &'static str, payload: String },
    #[error("relevance payload field `{field}` is not a boolean: {payload}")]
    InvalidRelevanceField { field: &'static str, payload: String },
    #[error("relevance payload is not a JSON object ({reason}): {payload}")]
    MalformedRelevancePayload { payload: String, reason: String },
}

/// A collaborator (agent service, ruleset store, memory store) reported a failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{service} failure: {message}")]
pub struct ExternalServiceError {
    pub service: &'static str,
    pub message: String,
}

impl ExternalServiceError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self { service, message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    #[error("agent run failed: {0}")]
    AgentRun(String),
    #[error("catalog ruleset `{0}` was not found")]
    RulesetNotFound(String),
    #[error("invalid input template: {0}")]
    InvalidTemplate(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Short stable label for structured logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Contract(_) => "contract_violation",
            Self::ExternalService(_) => "external_service",
            Self::AgentRun(_) => "agent_run",
            Self::RulesetNotFound(_) => "ruleset_not_found",
            Self::InvalidTemplate(_) => "invalid_template",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Contract(_) => Self::BadRequest { message, correlation_id },
            ApplicationError::ExternalService(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::AgentRun(detail) => {
                Self::ServiceUnavailable { message: detail, correlation_id }
            }
            ApplicationError::RulesetNotFound(_)
            | ApplicationError::InvalidTemplate(_)
            | ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, ContractViolation, ExternalServiceError, InterfaceError};

    #[test]
    fn contract_violation_maps_to_bad_request() {
        let interface = ApplicationError::from(ContractViolation::UnknownTool {
            token: "web_tool".to_owned(),
            known: "slack_tool".to_owned(),
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, ref message }
                if correlation_id == "req-1" && message.contains("web_tool")
        ));
    }

    #[test]
    fn external_failures_map_to_service_unavailable() {
        let interface =
            ApplicationError::from(ExternalServiceError::new("ruleset_store", "timeout"))
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );

        let agent = ApplicationError::AgentRun("rate limited".to_owned()).into_interface("req-3");
        assert!(matches!(agent, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(agent.correlation_id(), "req-3");
    }

    #[test]
    fn missing_catalog_ruleset_maps_to_internal() {
        let interface =
            ApplicationError::RulesetNotFound("f5a9".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn error_classes_are_stable() {
        assert_eq!(ApplicationError::AgentRun(String::new()).class(), "agent_run");
        assert_eq!(
            ApplicationError::InvalidTemplate(String::new()).class(),
            "invalid_template"
        );
    }
}
