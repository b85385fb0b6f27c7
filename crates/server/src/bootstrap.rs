use std::sync::Arc;

use safepath_agent::{AgentError, AgentRegistry};
use safepath_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agents: Arc<AgentRegistry>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent construction failed: {0}")]
    Agents(#[source] AgentError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "starting application bootstrap"
    );

    let agents = AgentRegistry::from_config(&config).map_err(BootstrapError::Agents)?;
    for (key, entry) in agents.entries() {
        info!(
            event_name = "system.bootstrap.agent_ready",
            correlation_id = "bootstrap",
            thread_id = "unknown",
            agent = key,
            model = entry.graph.model_name(),
            tools = entry.graph.tools().len(),
            step_budget = entry.graph.step_budget(),
            "agent graph constructed"
        );
    }

    Ok(Application { config, agents: Arc::new(agents) })
}

#[cfg(test)]
mod tests {
    use safepath_agent::DEFAULT_AGENT;
    use safepath_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?)
    }

    #[test]
    fn bootstrap_rejects_non_http_backend_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                backend_url: Some("ftp://maps.invalid".to_string()),
                backend_api_token: Some("token".to_string()),
                backend_user_id: Some("user-1".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("error").to_string();
        assert!(message.contains("backend.base_url"));
    }

    #[test]
    fn bootstrap_registers_travel_assistant_with_full_tool_set() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                backend_url: Some("http://127.0.0.1:9".to_string()),
                backend_api_token: Some("token".to_string()),
                backend_user_id: Some("user-1".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.agents.default_key(), DEFAULT_AGENT);
        let graph = app.agents.graph(DEFAULT_AGENT).expect("graph");
        assert_eq!(
            graph.tools().names(),
            vec![
                "WebSearch",
                "Calculator",
                "Nearby_Places",
                "Current_Location",
                "get_route",
                "sos_alert"
            ]
        );
    }
}
