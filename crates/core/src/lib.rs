pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::conversation::{ConversationState, ThreadId};
pub use domain::message::{Message, Role, ToolCall};
pub use domain::persona::Persona;
pub use domain::safety::{SafetyAssessment, SafetyVerdict};
pub use errors::{ApplicationError, DomainError, InterfaceError};
