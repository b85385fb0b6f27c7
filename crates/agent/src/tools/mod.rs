pub mod backend;
pub mod calculator;
pub mod location;
pub mod nearby;
pub mod route;
pub mod sos;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use safepath_core::config::AppConfig;
use safepath_core::domain::message::ToolCall;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolDefinition;

pub use backend::BackendClient;
pub use calculator::CalculatorTool;
pub use location::CurrentLocationTool;
pub use nearby::NearbyPlacesTool;
pub use route::RouteTool;
pub use sos::SosAlertTool;
pub use web_search::WebSearchTool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("{context}: {message}")]
    Request { context: &'static str, message: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error(
        "calculator(\"{expression}\") raised error: {cause}. Please try again with a valid numerical expression"
    )]
    Calculator { expression: String, cause: String },
    #[error("could not build http client: {0}")]
    Client(String),
}

impl ToolError {
    /// Wraps a lower-level failure with the user-facing operation name.
    pub fn request(context: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Request { context, message: cause.to_string() }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

pub(crate) fn parse_arguments<T>(tool: &str, arguments: Value) -> Result<T, ToolError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(arguments).map_err(|error| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: error.to_string(),
    })
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| ToolError::Client(error.to_string()))
}

/// Tool message content for a failed call.
pub fn error_content(cause: impl std::fmt::Display) -> String {
    format!("Error: {cause}\n Please fix your mistakes.")
}

/// Registered tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter().position(|existing| existing.name() == tool.name()) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    /// The fixed travel-safety tool set wired to the configured services.
    pub fn from_config(config: &AppConfig) -> Result<Self, ToolError> {
        let backend = Arc::new(BackendClient::from_config(&config.backend)?);
        let timeout = Duration::from_secs(config.backend.timeout_secs);

        let mut registry = Self::default();
        registry.register(WebSearchTool::new(
            config.services.search_url.clone(),
            config.services.search_max_results,
            timeout,
        )?);
        registry.register(CalculatorTool);
        registry.register(NearbyPlacesTool::new(backend.clone()));
        registry.register(CurrentLocationTool::new(
            config.services.geolocation_url.clone(),
            timeout,
        )?);
        registry.register(RouteTool::new(backend.clone()));
        registry.register(SosAlertTool::new(backend));
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Runs one call and renders the tool message content. Failures are
    /// rendered as error content so the model can correct itself.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self.get(&call.name) else {
            let content = format!(
                "Error: {} is not a valid tool, try one of [{}].",
                call.name,
                self.names().join(", ")
            );
            return ToolOutcome { content, failed: true };
        };

        match tool.execute(call.arguments.clone()).await {
            Ok(value) => ToolOutcome { content: render_output(value), failed: false },
            Err(error) => ToolOutcome { content: error_content(error), failed: true },
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub failed: bool,
}

fn render_output(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use safepath_core::domain::message::ToolCall;
    use serde_json::{json, Value};

    use super::{CalculatorTool, Tool, ToolError, ToolRegistry};

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "get_route"
        }

        fn description(&self) -> &'static str {
            "always fails"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
            Err(ToolError::request("Error getting route", "connection refused"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(CalculatorTool);
        registry.register(FailingTool);
        registry
    }

    #[tokio::test]
    async fn successful_call_renders_plain_string_output() {
        let outcome = registry()
            .dispatch(&ToolCall::new("c1", "Calculator", json!({"expression": "2 + 2"})))
            .await;
        assert!(!outcome.failed);
        assert_eq!(outcome.content, "4");
    }

    #[tokio::test]
    async fn failing_tool_becomes_error_content() {
        let outcome = registry().dispatch(&ToolCall::new("c2", "get_route", json!({}))).await;
        assert!(outcome.failed);
        assert_eq!(
            outcome.content,
            "Error: Error getting route: connection refused\n Please fix your mistakes."
        );
    }

    #[tokio::test]
    async fn unknown_tool_lists_the_valid_names() {
        let outcome = registry().dispatch(&ToolCall::new("c3", "Weather", json!({}))).await;
        assert!(outcome.failed);
        assert_eq!(
            outcome.content,
            "Error: Weather is not a valid tool, try one of [Calculator, get_route]."
        );
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_to_the_model() {
        let outcome =
            registry().dispatch(&ToolCall::new("c4", "Calculator", json!({"expr": "1"}))).await;
        assert!(outcome.failed);
        assert!(outcome.content.starts_with("Error: invalid arguments for `Calculator`"));
    }

    #[test]
    fn registering_same_name_replaces_and_keeps_order() {
        let mut registry = registry();
        registry.register(CalculatorTool);
        assert_eq!(registry.names(), vec!["Calculator", "get_route"]);
        assert_eq!(registry.definitions()[1].name, "get_route");
        assert_eq!(registry.len(), 2);
    }
}
