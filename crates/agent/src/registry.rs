use std::collections::BTreeMap;
use std::sync::Arc;

use safepath_core::config::AppConfig;
use serde::Serialize;

use crate::errors::AgentError;
use crate::runtime::AgentGraph;

pub const DEFAULT_AGENT: &str = "travel-chatbot-assistant";
pub const DEFAULT_AGENT_DESCRIPTION: &str = "A travel chatbot assistant";

pub struct AgentEntry {
    pub description: String,
    pub graph: Arc<AgentGraph>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub key: String,
    pub description: String,
}

/// Agents by key. Built once at startup and read-only afterwards.
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentEntry>,
    default_key: String,
}

impl AgentRegistry {
    pub fn new(default_key: impl Into<String>) -> Self {
        Self { agents: BTreeMap::new(), default_key: default_key.into() }
    }

    /// The travel assistant as the only and default agent.
    pub fn with_travel_assistant(graph: AgentGraph) -> Self {
        let mut registry = Self::new(DEFAULT_AGENT);
        registry.register(DEFAULT_AGENT, DEFAULT_AGENT_DESCRIPTION, graph);
        registry
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        Ok(Self::with_travel_assistant(AgentGraph::from_config(config)?))
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
        graph: AgentGraph,
    ) {
        self.agents.insert(
            key.into(),
            AgentEntry { description: description.into(), graph: Arc::new(graph) },
        );
    }

    pub fn get(&self, key: &str) -> Result<&AgentEntry, AgentError> {
        self.agents.get(key).ok_or_else(|| AgentError::UnknownAgent(key.to_string()))
    }

    pub fn graph(&self, key: &str) -> Result<Arc<AgentGraph>, AgentError> {
        self.get(key).map(|entry| entry.graph.clone())
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents
            .iter()
            .map(|(key, entry)| AgentInfo { key: key.clone(), description: entry.description.clone() })
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &AgentEntry)> {
        self.agents.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
