use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use safepath_agent::{AgentError, AgentInfo, AgentRegistry, TurnReport};
use safepath_core::domain::conversation::ThreadId;
use safepath_core::errors::InterfaceError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct ApiState {
    agents: Arc<AgentRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub agent: String,
    pub correlation_id: String,
    #[serde(flatten)]
    pub report: TurnReport,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub agents: Vec<AgentInfo>,
    pub default_agent: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    correlation_id: &'a str,
}

/// Interface errors rendered as JSON with a user-safe message.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body =
            ErrorBody { error: self.0.user_message(), correlation_id: self.0.correlation_id() };
        (status, Json(body)).into_response()
    }
}

fn reject(error: AgentError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    match &interface {
        InterfaceError::Internal { message, .. } => error!(
            event_name = "system.api.request_failed",
            correlation_id,
            error = %message,
            "request failed"
        ),
        other => warn!(
            event_name = "system.api.request_rejected",
            correlation_id,
            error = %other,
            "request rejected"
        ),
    }
    ApiError(interface)
}

pub fn router(agents: Arc<AgentRegistry>) -> Router {
    let api = Router::new()
        .route("/info", get(info_handler))
        .route("/invoke", post(invoke_default))
        .route("/{agent_id}/invoke", post(invoke_agent))
        .route("/{agent_id}/threads", post(open_thread))
        .route("/{agent_id}/threads/{thread_id}", delete(evict_thread))
        .with_state(ApiState { agents: agents.clone() });

    api.merge(health::router(agents))
}

async fn info_handler(State(state): State<ApiState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        agents: state.agents.list(),
        default_agent: state.agents.default_key().to_string(),
    })
}

async fn invoke_default(
    State(state): State<ApiState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let agent_id = state.agents.default_key().to_string();
    invoke(&state, agent_id, request).await
}

async fn invoke_agent(
    State(state): State<ApiState>,
    Path(agent_id): Path<String>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    invoke(&state, agent_id, request).await
}

async fn invoke(
    state: &ApiState,
    agent_id: String,
    request: InvokeRequest,
) -> Result<Json<InvokeResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    if request.message.trim().is_empty() {
        return Err(ApiError(InterfaceError::BadRequest {
            message: "message must not be empty".to_string(),
            correlation_id,
        }));
    }

    let graph = state.agents.graph(&agent_id).map_err(|error| reject(error, &correlation_id))?;
    let thread_id = request.thread_id.filter(|id| !id.trim().is_empty()).map(ThreadId);
    let report = graph
        .invoke(thread_id, &request.message)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    info!(
        event_name = "system.api.turn_completed",
        correlation_id = %correlation_id,
        thread_id = %report.thread_id,
        agent = %agent_id,
        tool_calls = report.tool_calls,
        remaining_steps = report.remaining_steps,
        "turn completed"
    );
    Ok(Json(InvokeResponse { agent: agent_id, correlation_id, report }))
}

async fn open_thread(
    State(state): State<ApiState>,
    Path(agent_id): Path<String>,
) -> Result<(StatusCode, Json<InvokeResponse>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let graph = state.agents.graph(&agent_id).map_err(|error| reject(error, &correlation_id))?;
    let report = graph.open(None).await.map_err(|error| reject(error, &correlation_id))?;

    info!(
        event_name = "system.api.thread_opened",
        correlation_id = %correlation_id,
        thread_id = %report.thread_id,
        agent = %agent_id,
        "thread opened"
    );
    Ok((StatusCode::CREATED, Json(InvokeResponse { agent: agent_id, correlation_id, report })))
}

async fn evict_thread(
    State(state): State<ApiState>,
    Path((agent_id, thread_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let graph = state.agents.graph(&agent_id).map_err(|error| reject(error, &correlation_id))?;

    let thread_id = ThreadId(thread_id);
    if !graph.store().evict(&thread_id).await {
        return Err(reject(AgentError::UnknownThread(thread_id.to_string()), &correlation_id));
    }

    info!(
        event_name = "system.api.thread_evicted",
        correlation_id = %correlation_id,
        thread_id = %thread_id,
        agent = %agent_id,
        "thread evicted"
    );
    Ok(StatusCode::NO_CONTENT)
}
