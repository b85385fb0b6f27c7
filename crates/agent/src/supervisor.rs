use std::sync::Arc;

use safepath_core::domain::conversation::ConversationState;
use safepath_core::domain::message::Message;
use safepath_core::domain::persona::Persona;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::guardrails::{GuardRole, SafetyGuard};
use crate::instructions::InstructionSet;
use crate::llm::{ChatModel, ChatRequest, ToolDefinition};
use crate::routing::classify_persona;

pub const GREETING: &str = "Hello! I'm your travel safety companion. I'm here to support you and help ensure your safety during your travels.\n\
I can help you with:\n\
- Location safety information and tips\n\
- Emergency guidance and resources\n\
- General travel safety advice and companionship\n\
\n\
How can I assist you today? Feel free to ask any questions about your travel safety concerns.";

pub const APOLOGY: &str = "I apologize, but I need more steps to process this request. Would you like me to help you with something else?";

/// What a single supervisor pass appended to the history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorOutcome {
    Greeted,
    Flagged,
    Apologized,
    Responded { tool_calls: usize },
}

pub struct Supervisor {
    model: Arc<dyn ChatModel>,
    guard: Arc<dyn SafetyGuard>,
    instructions: Arc<InstructionSet>,
    tools: Vec<ToolDefinition>,
    temperature: Option<f32>,
}

impl Supervisor {
    pub fn new(
        model: Arc<dyn ChatModel>,
        guard: Arc<dyn SafetyGuard>,
        instructions: Arc<InstructionSet>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self { model, guard, instructions, tools, temperature: None }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Appends exactly one assistant message to `state`.
    pub async fn step(&self, state: &mut ConversationState) -> Result<SupervisorOutcome, AgentError> {
        if state.needs_greeting() {
            state.push(Message::assistant(GREETING));
            state.set_persona(Persona::Companion);
            state.complete_first_run();
            info!(
                event_name = "agent.supervisor.greeted",
                thread_id = %state.thread_id(),
                "conversation opened with greeting"
            );
            return Ok(SupervisorOutcome::Greeted);
        }

        let latest = state.last_message().map(Message::content).unwrap_or_default();
        let persona = classify_persona(latest);
        state.set_persona(persona);
        info!(
            event_name = "agent.supervisor.routed",
            thread_id = %state.thread_id(),
            persona = %persona,
            remaining_steps = state.remaining_steps(),
            "message routed to persona"
        );

        let mut messages = Vec::with_capacity(state.messages().len() + 1);
        messages.push(Message::system(self.instructions.for_persona(Some(persona))));
        messages.extend(state.messages().iter().cloned());

        let reply = self
            .model
            .chat(ChatRequest { messages, tools: self.tools.clone(), temperature: self.temperature })
            .await
            .map_err(AgentError::Model)?;

        let mut screened = state.messages().to_vec();
        screened.push(reply.clone());
        let assessment =
            self.guard.assess(GuardRole::Agent, &screened).await.map_err(AgentError::Guard)?;

        if assessment.is_unsafe() {
            warn!(
                event_name = "agent.supervisor.flagged",
                thread_id = %state.thread_id(),
                categories = ?assessment.unsafe_categories,
                "model reply withheld by safety guard"
            );
            state.push(Message::assistant(assessment.flagged_message()));
            state.record_safety(assessment);
            return Ok(SupervisorOutcome::Flagged);
        }
        state.record_safety(assessment);

        if state.remaining_steps() < 2 && !reply.tool_calls().is_empty() {
            info!(
                event_name = "agent.supervisor.out_of_steps",
                thread_id = %state.thread_id(),
                requested_tools = reply.tool_calls().len(),
                "tool calls dropped for lack of steps"
            );
            let id = reply.assistant_id().map(str::to_string);
            state.push(Message::assistant_with_tools(id, APOLOGY, Vec::new()));
            return Ok(SupervisorOutcome::Apologized);
        }

        let tool_calls = reply.tool_calls().len();
        state.push(reply);
        Ok(SupervisorOutcome::Responded { tool_calls })
    }
}
