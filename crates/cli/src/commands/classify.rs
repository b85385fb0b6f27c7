use safepath_agent::routing::classify_persona;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct Classification<'a> {
    command: &'static str,
    status: &'static str,
    persona: &'static str,
    text: &'a str,
}

pub fn run(text: &str) -> CommandResult {
    if text.trim().is_empty() {
        return CommandResult::failure("classify", "invalid_input", "message text is empty", 1);
    }

    let payload = Classification {
        command: "classify",
        status: "ok",
        persona: classify_persona(text).key(),
        text,
    };
    match serde_json::to_string(&payload) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("classify", "serialization", error.to_string(), 1),
    }
}
