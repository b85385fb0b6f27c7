use safepath_core::domain::conversation::ConversationState;
use safepath_core::domain::message::Message;
use safepath_core::domain::persona::Persona;

const EMERGENCY_KEYWORDS: [&str; 7] =
    ["emergency", "help", "danger", "unsafe", "threat", "attack", "harassment"];

const LOCATION_KEYWORDS: [&str; 6] =
    ["location", "place", "area", "destination", "neighborhood", "region"];

/// Where the graph goes after a supervisor pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    Supervisor,
    Tools,
    Done,
}

impl Next {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Tools => "tools",
            Self::Done => "done",
        }
    }
}

/// Substring match on the lower-cased text. Emergency wins over location.
pub fn classify_persona(text: &str) -> Persona {
    let text = text.to_lowercase();

    if EMERGENCY_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return Persona::Emergency;
    }
    if LOCATION_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return Persona::Location;
    }
    Persona::Companion
}

pub fn route_next(state: &ConversationState) -> Next {
    match state.last_message() {
        Some(message @ Message::Assistant { .. }) if !message.tool_calls().is_empty() => {
            Next::Tools
        }
        Some(Message::Assistant { .. }) => Next::Done,
        _ => Next::Supervisor,
    }
}
