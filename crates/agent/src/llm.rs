use std::time::Duration;

use async_trait::async_trait;
use safepath_core::config::{LlmConfig, LlmProvider};
use safepath_core::domain::message::{Message, ToolCall};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const INITIAL_RETRY_DELAY_MS: u64 = 250;
const MAX_RETRY_DELAY_MS: u64 = 4_000;

/// Function-tool schema advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat model request failed: {0}")]
    Transport(String),
    #[error("chat model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode chat model response: {0}")]
    Decode(String),
    #[error("chat model returned no choices")]
    EmptyChoices,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::EmptyChoices => false,
        }
    }
}

/// A chat-completion backend. Returns one assistant message per call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<Message, LlmError>;
    fn model_name(&self) -> &str;
}

/// Client for any server speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatibleClient {
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_retries,
            http_client,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let default_base = match config.provider {
            LlmProvider::OpenAi => DEFAULT_OPENAI_BASE_URL,
            LlmProvider::Ollama => DEFAULT_OLLAMA_BASE_URL,
        };
        let base_url = config.base_url.clone().unwrap_or_else(|| default_base.to_string());

        Self::new(
            base_url,
            config.model.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request_body(&self, request: &ChatRequest) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(WireMessage::from_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool { kind: "function", function: tool.clone() })
                .collect(),
            temperature: request.temperature,
        }
    }

    async fn send_once(&self, body: &WireRequest) -> Result<Message, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut http_request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key.expose_secret());
        }

        let response = http_request
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let payload: WireResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        payload.into_message()
    }

    fn retry_delay(attempt: u32) -> Duration {
        let delay = INITIAL_RETRY_DELAY_MS.saturating_mul(1_u64 << attempt.min(8));
        Duration::from_millis(delay.min(MAX_RETRY_DELAY_MS))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleClient {
    async fn chat(&self, request: ChatRequest) -> Result<Message, LlmError> {
        let body = self.build_request_body(&request);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(message) => return Ok(message),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = Self::retry_delay(attempt);
                    warn!(
                        event_name = "agent.llm.retry",
                        model = %self.model,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying chat model request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolDefinition,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl WireMessage {
    fn from_message(message: &Message) -> Self {
        let mut wire = Self {
            role: message.role().as_str(),
            content: message.content().to_string(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        };

        match message {
            Message::Assistant { tool_calls, .. } => {
                wire.tool_calls = tool_calls.iter().map(WireToolCall::from_call).collect();
            }
            Message::Tool { tool_call_id, name, .. } => {
                wire.tool_call_id = Some(tool_call_id.clone());
                wire.name = Some(name.clone());
            }
            Message::System { .. } | Message::User { .. } => {}
        }

        wire
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

impl WireToolCall {
    fn from_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }

    fn into_call(self) -> Result<ToolCall, LlmError> {
        let arguments = if self.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str::<Value>(&self.function.arguments).map_err(|error| {
                LlmError::Decode(format!(
                    "tool call `{}` has malformed arguments: {error}",
                    self.function.name
                ))
            })?
        };

        if !arguments.is_object() {
            return Err(LlmError::Decode(format!(
                "tool call `{}` arguments must be a JSON object",
                self.function.name
            )));
        }

        Ok(ToolCall::new(self.id, self.function.name, arguments))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl WireResponse {
    fn into_message(self) -> Result<Message, LlmError> {
        let choice = self.choices.into_iter().next().ok_or(LlmError::EmptyChoices)?;
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_call)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Message::assistant_with_tools(
            self.id,
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ))
    }
}
