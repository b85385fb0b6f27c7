use std::sync::Arc;

use chrono::Local;
use safepath_core::config::AppConfig;
use safepath_core::domain::conversation::{ConversationState, ThreadId};
use safepath_core::domain::message::Message;
use safepath_core::domain::persona::Persona;
use safepath_core::domain::safety::SafetyAssessment;
use safepath_core::errors::DomainError;
use serde::Serialize;
use tracing::{debug, info};

use crate::conversation::ConversationStore;
use crate::errors::AgentError;
use crate::guardrails::{LlamaGuard, SafetyGuard};
use crate::instructions::InstructionSet;
use crate::llm::{ChatModel, OpenAiCompatibleClient};
use crate::routing::{route_next, Next};
use crate::supervisor::Supervisor;
use crate::tools::ToolRegistry;

/// Outcome of one request against a thread.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnReport {
    pub thread_id: ThreadId,
    pub reply: Message,
    pub persona: Option<Persona>,
    pub safety: Option<SafetyAssessment>,
    pub remaining_steps: u32,
    pub tool_calls: usize,
}

/// Supervisor and tool nodes joined by the `route_next` edge, with
/// per-thread state held in a `ConversationStore`.
pub struct AgentGraph {
    supervisor: Supervisor,
    tools: Arc<ToolRegistry>,
    store: ConversationStore,
    step_budget: u32,
}

impl AgentGraph {
    pub fn new(
        model: Arc<dyn ChatModel>,
        guard: Arc<dyn SafetyGuard>,
        instructions: InstructionSet,
        tools: ToolRegistry,
        step_budget: u32,
    ) -> Self {
        let supervisor =
            Supervisor::new(model, guard, Arc::new(instructions), tools.definitions());
        Self { supervisor, tools: Arc::new(tools), store: ConversationStore::new(), step_budget }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        let model = OpenAiCompatibleClient::from_config(&config.llm).map_err(AgentError::Model)?;
        let guard = LlamaGuard::from_config(&config.guard).map_err(AgentError::Guard)?;
        let instructions = InstructionSet::with_overrides(
            Local::now().date_naive(),
            &config.agent.instructions,
        );
        let tools = ToolRegistry::from_config(config)?;

        let graph = Self::new(
            Arc::new(model),
            Arc::new(guard),
            instructions,
            tools,
            config.agent.step_budget,
        )
        .with_temperature(config.llm.temperature);
        Ok(graph)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.supervisor = self.supervisor.with_temperature(temperature);
        self
    }

    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn step_budget(&self) -> u32 {
        self.step_budget
    }

    pub fn model_name(&self) -> &str {
        self.supervisor.model_name()
    }

    /// Appends `text` as a user message and runs until the graph is done.
    /// A missing thread id starts a new thread.
    pub async fn invoke(
        &self,
        thread_id: Option<ThreadId>,
        text: &str,
    ) -> Result<TurnReport, AgentError> {
        let thread_id = match thread_id {
            Some(thread_id) => thread_id,
            None => self.store.create().await,
        };
        let handle = self.store.get_or_create(&thread_id).await;
        let mut state = handle.lock().await;

        state.push(Message::user(text));
        self.run(&mut state).await
    }

    /// Runs the supervisor on the current history without adding input.
    /// On a fresh thread this produces the greeting.
    pub async fn open(&self, thread_id: Option<ThreadId>) -> Result<TurnReport, AgentError> {
        let thread_id = match thread_id {
            Some(thread_id) => thread_id,
            None => self.store.create().await,
        };
        let handle = self.store.get_or_create(&thread_id).await;
        let mut state = handle.lock().await;

        self.run(&mut state).await
    }

    pub async fn history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, AgentError> {
        let handle = self
            .store
            .get(thread_id)
            .await
            .ok_or_else(|| AgentError::UnknownThread(thread_id.to_string()))?;
        let messages = handle.snapshot().await.messages().to_vec();
        Ok(messages)
    }

    async fn run(&self, state: &mut ConversationState) -> Result<TurnReport, AgentError> {
        state.begin_request(self.step_budget);
        let mut tool_calls = 0;
        let mut node = Next::Supervisor;

        loop {
            match node {
                Next::Supervisor => {
                    state.consume_step()?;
                    let outcome = self.supervisor.step(state).await?;
                    node = route_next(state);
                    debug!(
                        event_name = "agent.graph.edge",
                        thread_id = %state.thread_id(),
                        outcome = ?outcome,
                        next = node.as_str(),
                        "supervisor pass finished"
                    );
                }
                Next::Tools => {
                    state.consume_step()?;
                    tool_calls += self.execute_tools(state).await;
                    node = Next::Supervisor;
                }
                Next::Done => break,
            }
        }

        let reply = state.last_assistant_message().cloned().ok_or_else(|| {
            DomainError::InvariantViolation("graph finished without an assistant reply".into())
        })?;

        Ok(TurnReport {
            thread_id: state.thread_id().clone(),
            reply,
            persona: state.current_persona(),
            safety: state.safety().cloned(),
            remaining_steps: state.remaining_steps(),
            tool_calls,
        })
    }

    async fn execute_tools(&self, state: &mut ConversationState) -> usize {
        let calls =
            state.last_message().map(|message| message.tool_calls().to_vec()).unwrap_or_default();

        for call in &calls {
            let outcome = self.tools.dispatch(call).await;
            info!(
                event_name = "agent.tools.executed",
                thread_id = %state.thread_id(),
                tool = %call.name,
                tool_call_id = %call.id,
                failed = outcome.failed,
                "tool call executed"
            );
            state.push(Message::tool(call.id.clone(), call.name.clone(), outcome.content));
        }

        calls.len()
    }
}
