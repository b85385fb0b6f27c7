//! Agent runtime for the SafePath travel safety assistant.
//!
//! An agent is a two-node graph:
//! 1. **Supervisor** (`supervisor`) greets, picks a persona (`routing`),
//!    calls the chat model (`llm`) and screens the reply (`guardrails`)
//! 2. **Tools** (`tools`) executes every tool call on the latest reply
//!
//! `runtime::AgentGraph` drives the loop under a per-request step budget
//! and keeps per-thread history in `conversation::ConversationStore`.
//! `registry::AgentRegistry` exposes graphs by key to the server and CLI.
//!
//! # Safety Principle
//!
//! No model output reaches the user before the guard has assessed it.
//! Unsafe replies are replaced, never appended.

pub mod conversation;
pub mod errors;
pub mod guardrails;
pub mod instructions;
pub mod llm;
pub mod registry;
pub mod routing;
pub mod runtime;
pub mod speech;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;

pub use errors::AgentError;
pub use registry::{AgentInfo, AgentRegistry, DEFAULT_AGENT};
pub use runtime::{AgentGraph, TurnReport};
