use safepath_core::errors::{ApplicationError, DomainError, InterfaceError};
use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("chat model failed: {0}")]
    Model(#[source] LlmError),
    #[error("safety guard failed: {0}")]
    Guard(#[source] LlmError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("unknown agent `{0}`")]
    UnknownAgent(String),
    #[error("unknown thread `{0}`")]
    UnknownThread(String),
    #[error("tool setup failed: {0}")]
    ToolSetup(#[from] ToolError),
}

impl AgentError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        ApplicationError::from(self).into_interface(correlation_id)
    }
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Model(_) | AgentError::Guard(_) => Self::Integration(error.to_string()),
            AgentError::Domain(domain) => Self::Domain(domain),
            AgentError::UnknownAgent(_) | AgentError::UnknownThread(_) => {
                Self::NotFound(error.to_string())
            }
            AgentError::ToolSetup(_) => Self::Configuration(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use safepath_core::errors::{DomainError, InterfaceError};

    use super::AgentError;
    use crate::llm::LlmError;

    #[test]
    fn model_failures_are_service_unavailable() {
        let interface = AgentError::Model(LlmError::Status { status: 502, body: "bad".into() })
            .into_interface("req-1");
        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref message, .. } if message.contains("502")
        ));
        assert_eq!(interface.correlation_id(), "req-1");
    }

    #[test]
    fn unknown_agent_is_not_found() {
        let interface = AgentError::UnknownAgent("weather-bot".into()).into_interface("req-2");
        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref message, .. } if message == "unknown agent `weather-bot`"
        ));
    }

    #[test]
    fn exhausted_budget_is_internal() {
        let interface =
            AgentError::from(DomainError::StepBudgetExhausted { thread_id: "t-1".into() })
                .into_interface("req-3");
        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }
}
