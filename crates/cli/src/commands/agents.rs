use std::path::Path;

use safepath_agent::{AgentInfo, AgentRegistry};
use safepath_core::config::AppConfig;
use serde::Serialize;

use crate::commands::{load_options, CommandResult, EXIT_AGENT, EXIT_CONFIG};

#[derive(Debug, Serialize)]
struct AgentListing {
    command: &'static str,
    status: &'static str,
    default_agent: String,
    agents: Vec<AgentInfo>,
}

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("agents", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };

    let registry = match AgentRegistry::from_config(&config) {
        Ok(registry) => registry,
        Err(error) => {
            return CommandResult::failure("agents", "agent_setup", error.to_string(), EXIT_AGENT)
        }
    };

    let listing = AgentListing {
        command: "agents",
        status: "ok",
        default_agent: registry.default_key().to_string(),
        agents: registry.list(),
    };
    match serde_json::to_string(&listing) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("agents", "serialization", error.to_string(), 1),
    }
}
