use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::message::Message;
use crate::domain::persona::Persona;
use crate::domain::safety::SafetyAssessment;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-thread state shared by the supervisor and tool steps.
///
/// The message history is append-only. The step counter is refilled by
/// `begin_request` and otherwise only moves down.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    thread_id: ThreadId,
    messages: Vec<Message>,
    safety: Option<SafetyAssessment>,
    remaining_steps: u32,
    current_persona: Option<Persona>,
    first_run: bool,
}

impl ConversationState {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            messages: Vec::new(),
            safety: None,
            remaining_steps: 0,
            current_persona: None,
            first_run: true,
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.is_assistant())
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn safety(&self) -> Option<&SafetyAssessment> {
        self.safety.as_ref()
    }

    pub fn record_safety(&mut self, assessment: SafetyAssessment) {
        self.safety = Some(assessment);
    }

    pub fn remaining_steps(&self) -> u32 {
        self.remaining_steps
    }

    /// Refills the step counter for a new user request.
    pub fn begin_request(&mut self, step_budget: u32) {
        self.remaining_steps = step_budget;
        self.safety = None;
    }

    /// Spends one step for a node execution.
    pub fn consume_step(&mut self) -> Result<u32, DomainError> {
        if self.remaining_steps == 0 {
            return Err(DomainError::StepBudgetExhausted { thread_id: self.thread_id.0.clone() });
        }
        self.remaining_steps -= 1;
        Ok(self.remaining_steps)
    }

    pub fn current_persona(&self) -> Option<Persona> {
        self.current_persona
    }

    pub fn set_persona(&mut self, persona: Persona) {
        self.current_persona = Some(persona);
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    pub fn complete_first_run(&mut self) {
        self.first_run = false;
    }

    pub fn needs_greeting(&self) -> bool {
        self.messages.is_empty() || self.first_run
    }
}
