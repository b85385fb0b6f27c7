use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use safepath_core::config::GuardConfig;
use safepath_core::domain::message::Message;
use safepath_core::domain::safety::SafetyAssessment;
use tracing::{debug, warn};

use crate::llm::{ChatModel, ChatRequest, LlmError, OpenAiCompatibleClient};

/// Whose messages the classifier is asked to judge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardRole {
    User,
    Agent,
}

impl fmt::Display for GuardRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "User",
            Self::Agent => "Agent",
        })
    }
}

#[async_trait]
pub trait SafetyGuard: Send + Sync {
    async fn assess(
        &self,
        role: GuardRole,
        messages: &[Message],
    ) -> Result<SafetyAssessment, LlmError>;
}

pub const UNSAFE_CONTENT_CATEGORIES: [(&str, &str); 14] = [
    ("S1", "Violent Crimes."),
    ("S2", "Non-Violent Crimes."),
    ("S3", "Sex Crimes."),
    ("S4", "Child Exploitation."),
    ("S5", "Defamation."),
    ("S6", "Specialized Advice."),
    ("S7", "Privacy."),
    ("S8", "Intellectual Property."),
    ("S9", "Indiscriminate Weapons."),
    ("S10", "Hate."),
    ("S11", "Self-Harm."),
    ("S12", "Sexual Content."),
    ("S13", "Elections."),
    ("S14", "Code Interpreter Abuse."),
];

/// Llama Guard classifier reached through an OpenAI-compatible endpoint.
///
/// Without a model the guard is disabled and every assessment is safe.
pub struct LlamaGuard {
    model: Option<Arc<dyn ChatModel>>,
}

impl LlamaGuard {
    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        Self { model: Some(model) }
    }

    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn from_config(config: &GuardConfig) -> Result<Self, LlmError> {
        let Some(api_key) = config.api_key.clone() else {
            warn!(
                event_name = "agent.guard.disabled",
                correlation_id = "bootstrap",
                thread_id = "unknown",
                "guard api key is not set; safety checks are disabled"
            );
            return Ok(Self::disabled());
        };

        let client = OpenAiCompatibleClient::new(
            config.base_url.clone(),
            config.model.clone(),
            Some(api_key),
            Duration::from_secs(config.timeout_secs),
            0,
        )?;
        Ok(Self::with_model(Arc::new(client)))
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }
}

#[async_trait]
impl SafetyGuard for LlamaGuard {
    async fn assess(
        &self,
        role: GuardRole,
        messages: &[Message],
    ) -> Result<SafetyAssessment, LlmError> {
        let Some(model) = &self.model else {
            return Ok(SafetyAssessment::safe());
        };

        let prompt = compile_prompt(role, messages);
        let reply = model
            .chat(ChatRequest {
                messages: vec![Message::user(prompt)],
                tools: Vec::new(),
                temperature: Some(0.0),
            })
            .await?;

        let assessment = parse_output(reply.content());
        debug!(
            event_name = "agent.guard.assessed",
            verdict = ?assessment.verdict,
            categories = ?assessment.unsafe_categories,
            "guard assessment parsed"
        );
        Ok(assessment)
    }
}

pub fn compile_prompt(role: GuardRole, messages: &[Message]) -> String {
    let categories = UNSAFE_CONTENT_CATEGORIES
        .iter()
        .map(|(code, name)| format!("{code}: {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    let conversation = messages
        .iter()
        .filter_map(|message| match message {
            Message::User { content } => Some(format!("User: {content}")),
            Message::Assistant { content, .. } => Some(format!("Agent: {content}")),
            Message::System { .. } | Message::Tool { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Task: Check if there is unsafe content in '{role}' messages in conversations according to our safety policy with the below categories.\n\
         \n\
         <BEGIN UNSAFE CONTENT CATEGORIES>\n\
         {categories}\n\
         <END UNSAFE CONTENT CATEGORIES>\n\
         \n\
         <BEGIN CONVERSATION>\n\
         \n\
         {conversation}\n\
         \n\
         <END CONVERSATION>\n\
         \n\
         Provide your safety assessment for ONLY THE LAST {role} in the above conversation:\n\
         - First line must read 'safe' or 'unsafe'.\n\
         - If unsafe, a second line must include a comma-separated list of violated categories."
    )
}

pub fn parse_output(output: &str) -> SafetyAssessment {
    if output == "safe" {
        return SafetyAssessment::safe();
    }

    let lines = output.split('\n').collect::<Vec<_>>();
    if lines.len() != 2 || lines[0] != "unsafe" {
        return SafetyAssessment::unreadable();
    }

    let mut categories = Vec::new();
    for code in lines[1].split(',') {
        let code = code.trim();
        let Some((_, name)) = UNSAFE_CONTENT_CATEGORIES.iter().find(|(key, _)| *key == code)
        else {
            return SafetyAssessment::unreadable();
        };
        categories.push(name.trim_matches('.').to_string());
    }

    SafetyAssessment::unsafe_with(categories)
}
