use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use safepath_agent::AgentRegistry;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    agents: Arc<AgentRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentHealth {
    pub key: String,
    pub model: String,
    pub tools: usize,
    pub active_threads: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub agents: Vec<AgentHealth>,
    pub checked_at: String,
}

pub fn router(agents: Arc<AgentRegistry>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { agents })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let mut agents = Vec::with_capacity(state.agents.len());
    for (key, entry) in state.agents.entries() {
        agents.push(AgentHealth {
            key: key.to_string(),
            model: entry.graph.model_name().to_string(),
            tools: entry.graph.tools().len(),
            active_threads: entry.graph.store().len().await,
        });
    }
    let ready = !agents.is_empty();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "safepath-server runtime initialized".to_string(),
        },
        agents,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
