//! Exercises the HTTP-backed tools, the chat client, the guard and the
//! speech client against in-process mock services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use safepath_agent::guardrails::LlamaGuard;
use safepath_agent::instructions::InstructionSet;
use safepath_agent::llm::{ChatModel, ChatRequest, LlmError, OpenAiCompatibleClient};
use safepath_agent::speech::SpeechClient;
use safepath_agent::tools::{
    BackendClient, CurrentLocationTool, NearbyPlacesTool, RouteTool, SosAlertTool, Tool,
    ToolRegistry, WebSearchTool,
};
use safepath_agent::AgentGraph;
use safepath_core::config::SpeechConfig;
use safepath_core::domain::message::{Message, ToolCall};
use safepath_core::domain::safety::SafetyVerdict;
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
struct Recorded {
    path: &'static str,
    body: Value,
    authorization: Option<String>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Recorded>>>);

impl Recorder {
    fn push(&self, path: &'static str, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.0.lock().expect("recorder").push(Recorded { path, body, authorization });
    }

    fn all(&self) -> Vec<Recorded> {
        self.0.lock().expect("recorder").clone()
    }

    fn paths(&self) -> Vec<&'static str> {
        self.all().into_iter().map(|entry| entry.path).collect()
    }
}

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock listener");
    let address = listener.local_addr().expect("mock address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{address}")
}

async fn geocode(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.push("geocode", &headers, body);
    Json(json!({ "latitude": 12.9716, "longitude": 77.5946 }))
}

async fn nearby(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.push("nearby", &headers, body);
    Json(json!({
        "status": "OK",
        "predictions": [{ "name": "Cubbon Park Police Station", "distance": 320 }]
    }))
}

async fn route(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.push("route", &headers, body);
    Json(json!({
        "routes": [{
            "legs": [{
                "steps": [
                    { "instructions": "Head east on MG Road", "readable_distance": "400 m", "readable_duration": "2 mins" },
                    { "instructions": "Turn left", "readable_distance": "1.1 km", "readable_duration": "5 mins" }
                ]
            }]
        }]
    }))
}

async fn route_safety(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.push("route_safety", &headers, body);
    Json(json!({ "safety_tips": "Stay on well-lit main roads." }))
}

async fn sos(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.push("sos", &headers, body);
    Json(json!({ "message": "SOS alert sent to 2 contacts" }))
}

async fn backend(recorder: Recorder) -> Arc<BackendClient> {
    let router = Router::new()
        .route("/api/maps/get-latitude-longitude", post(geocode))
        .route("/api/maps/nearby-safe-spots", post(nearby))
        .route("/api/maps/get-route", post(route))
        .route("/api/llm/route-safety", post(route_safety))
        .route("/api/sos/send-alert", post(sos))
        .with_state(recorder);
    let base_url = spawn(router).await;

    Arc::new(
        BackendClient::new(base_url, SecretString::from("backend-token"), "user-42", TIMEOUT)
            .expect("backend client"),
    )
}

#[tokio::test]
async fn nearby_places_geocodes_then_returns_predictions() {
    let recorder = Recorder::default();
    let tool = NearbyPlacesTool::new(backend(recorder.clone()).await);

    let output = tool.execute(json!({ "location": "MG Road, Bengaluru" })).await.expect("output");

    assert_eq!(output, json!([{ "name": "Cubbon Park Police Station", "distance": 320 }]));
    let calls = recorder.all();
    assert_eq!(recorder.paths(), vec!["geocode", "nearby"]);
    assert_eq!(calls[0].body, json!({ "address": "MG Road, Bengaluru" }));
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer backend-token"));
    assert_eq!(
        calls[1].body,
        json!({
            "current_location": {
                "latitude": 12.9716,
                "longitude": 77.5946,
                "address": "MG Road, Bengaluru"
            },
            "radius": 5000,
            "rank_by": "distance"
        })
    );
}

#[tokio::test]
async fn route_tool_combines_steps_and_safety_tips() {
    let recorder = Recorder::default();
    let tool = RouteTool::new(backend(recorder.clone()).await);

    let output = tool
        .execute(json!({ "start": "Indiranagar", "destination": "Koramangala" }))
        .await
        .expect("output");

    assert_eq!(
        output,
        json!({
            "route_steps": [
                { "instructions": "Head east on MG Road", "distance": "400 m", "duration": "2 mins" },
                { "instructions": "Turn left", "distance": "1.1 km", "duration": "5 mins" }
            ],
            "safety_tips": "Stay on well-lit main roads."
        })
    );
    assert_eq!(recorder.paths(), vec!["geocode", "geocode", "route", "route_safety"]);
    let calls = recorder.all();
    assert_eq!(calls[2].body["origin"]["address"], "Indiranagar");
    assert_eq!(calls[2].body["destination"]["address"], "Koramangala");
    assert_eq!(calls[3].body["route_steps"][1]["instructions"], "Turn left");
}

#[tokio::test]
async fn sos_alert_sends_user_and_default_message() {
    let recorder = Recorder::default();
    let tool = SosAlertTool::new(backend(recorder.clone()).await);

    let output = tool.execute(json!({ "location": "Majestic" })).await.expect("output");

    assert_eq!(output, json!("SOS alert sent to 2 contacts"));
    let alert = recorder.all().pop().expect("alert request");
    assert_eq!(alert.path, "sos");
    assert_eq!(alert.body["user_id"], "user-42");
    assert_eq!(alert.body["message"], "Help! I am in danger.");
    assert_eq!(alert.body["location"]["address"], "Majestic");
    let timestamp = alert.body["timestamp"].as_str().expect("timestamp");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn backend_failure_becomes_tool_error_content() {
    let router = Router::new().route(
        "/api/maps/get-latitude-longitude",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base_url = spawn(router).await;
    let backend = Arc::new(
        BackendClient::new(base_url, SecretString::from("t"), "u", TIMEOUT).expect("client"),
    );
    let mut registry = ToolRegistry::default();
    registry.register(NearbyPlacesTool::new(backend));

    let outcome = registry
        .dispatch(&ToolCall::new("c1", "Nearby_Places", json!({ "location": "Nowhere" })))
        .await;

    assert!(outcome.failed);
    assert!(outcome.content.starts_with("Error: Error getting nearby places: "));
    assert!(outcome.content.contains("returned status 500"));
    assert!(outcome.content.ends_with("\n Please fix your mistakes."));
}

#[tokio::test]
async fn current_location_reads_ipinfo_payload() {
    let router = Router::new().route(
        "/json",
        get(|| async {
            Json(json!({
                "ip": "198.51.100.4",
                "city": "Kochi",
                "region": "Kerala",
                "country": "IN",
                "postal": "682001",
                "loc": "9.9312,76.2673"
            }))
        }),
    );
    let base_url = spawn(router).await;
    let tool = CurrentLocationTool::new(format!("{base_url}/json"), TIMEOUT).expect("tool");

    let output = tool.execute(json!({})).await.expect("output");

    assert_eq!(output["latitude"], "9.9312");
    assert_eq!(output["longitude"], "76.2673");
    assert_eq!(output["address"], "Kochi, Kerala, IN");
    assert_eq!(output["postal"], "682001");
}

#[tokio::test]
async fn current_location_reports_status_code() {
    let router = Router::new().route("/json", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
    let base_url = spawn(router).await;
    let tool = CurrentLocationTool::new(format!("{base_url}/json"), TIMEOUT).expect("tool");

    let error = tool.execute(json!({})).await.expect_err("status error");

    assert_eq!(
        error.to_string(),
        "Error getting current location: Failed to get location data: 429"
    );
}

#[tokio::test]
async fn web_search_sends_query_and_caps_results() {
    let seen_query = Arc::new(Mutex::new(None::<String>));
    let captured = seen_query.clone();
    let router = Router::new().route(
        "/",
        get(move |axum::extract::RawQuery(query): axum::extract::RawQuery| {
            let captured = captured.clone();
            async move {
                *captured.lock().expect("query") = query;
                Json(json!({
                    "Heading": "Goa",
                    "AbstractText": "Goa is a state on the west coast of India.",
                    "AbstractURL": "https://example.org/goa",
                    "RelatedTopics": [
                        { "Text": "Beaches - Popular coastline", "FirstURL": "https://example.org/beaches" },
                        { "Name": "Nested", "Topics": [
                            { "Text": "Night markets - Weekend shopping", "FirstURL": "https://example.org/markets" }
                        ]}
                    ]
                }))
            }
        }),
    );
    let base_url = spawn(router).await;
    let tool = WebSearchTool::new(format!("{base_url}/"), 2, TIMEOUT).expect("tool");

    let output = tool.execute(json!({ "query": "goa night safety" })).await.expect("output");

    assert_eq!(
        output,
        json!([
            { "title": "Goa", "snippet": "Goa is a state on the west coast of India.", "link": "https://example.org/goa" },
            { "title": "Beaches", "snippet": "Beaches - Popular coastline", "link": "https://example.org/beaches" }
        ])
    );
    let query = seen_query.lock().expect("query").clone().expect("query string");
    assert!(query.contains("q=goa+night+safety"));
    assert!(query.contains("format=json"));
}

#[derive(Clone, Default)]
struct ChatMock {
    requests: Recorder,
    failures_left: Arc<AtomicUsize>,
}

async fn chat_completions(
    State(mock): State<ChatMock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    mock.requests.push("chat", &headers, body.clone());

    let failures = mock.failures_left.load(Ordering::SeqCst);
    if failures > 0 {
        mock.failures_left.store(failures - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }

    if body["model"] == "guard" {
        return Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "safe" } }]
        }))
        .into_response();
    }

    let has_tool_result = body["messages"]
        .as_array()
        .map(|messages| messages.iter().any(|message| message["role"] == "tool"))
        .unwrap_or(false);
    let reply = if has_tool_result {
        json!({ "role": "assistant", "content": "That works out to 12." })
    } else {
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call-7",
                "type": "function",
                "function": { "name": "Calculator", "arguments": "{\"expression\": \"3 * 4\"}" }
            }]
        })
    };
    Json(json!({ "id": "chatcmpl-1", "choices": [{ "message": reply }] })).into_response()
}

async fn chat_server(mock: ChatMock) -> String {
    let router =
        Router::new().route("/v1/chat/completions", post(chat_completions)).with_state(mock);
    spawn(router).await
}

#[tokio::test]
async fn chat_client_retries_unavailable_and_decodes_tool_calls() {
    let mock = ChatMock::default();
    mock.failures_left.store(1, Ordering::SeqCst);
    let base_url = chat_server(mock.clone()).await;
    let client = OpenAiCompatibleClient::new(
        base_url,
        "llama3.1",
        Some(SecretString::from("sk-test")),
        TIMEOUT,
        1,
    )
    .expect("client");

    let reply = client
        .chat(ChatRequest { messages: vec![Message::user("3 times 4?")], ..Default::default() })
        .await
        .expect("reply");

    assert_eq!(reply.assistant_id(), Some("chatcmpl-1"));
    assert_eq!(reply.tool_calls().len(), 1);
    assert_eq!(reply.tool_calls()[0].arguments, json!({ "expression": "3 * 4" }));

    let requests = mock.requests.all();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(requests[1].body["model"], "llama3.1");
    assert_eq!(requests[1].body["messages"][0], json!({ "role": "user", "content": "3 times 4?" }));
}

#[tokio::test]
async fn chat_client_gives_up_after_retry_budget() {
    let mock = ChatMock::default();
    mock.failures_left.store(5, Ordering::SeqCst);
    let base_url = chat_server(mock.clone()).await;
    let client =
        OpenAiCompatibleClient::new(base_url, "llama3.1", None, TIMEOUT, 0).expect("client");

    let error = client.chat(ChatRequest::default()).await.expect_err("unavailable");

    assert!(matches!(error, LlmError::Status { status: 503, .. }));
    assert_eq!(mock.requests.all().len(), 1);
    assert_eq!(mock.requests.all()[0].authorization, None);
}

#[tokio::test]
async fn graph_runs_tool_loop_through_http_model_and_guard() {
    let mock = ChatMock::default();
    let base_url = chat_server(mock.clone()).await;
    let model = OpenAiCompatibleClient::new(base_url.clone(), "llama3.1", None, TIMEOUT, 0)
        .expect("model");
    let guard_model =
        OpenAiCompatibleClient::new(base_url, "guard", None, TIMEOUT, 0).expect("guard model");

    let mut tools = ToolRegistry::default();
    tools.register(safepath_agent::tools::CalculatorTool);
    let graph = AgentGraph::new(
        Arc::new(model),
        Arc::new(LlamaGuard::with_model(Arc::new(guard_model))),
        InstructionSet::new(NaiveDate::from_ymd_opt(2025, 3, 14).expect("date")),
        tools,
        10,
    );

    let thread_id = graph.open(None).await.expect("greeting").thread_id;
    let report = graph.invoke(Some(thread_id.clone()), "What is 3 * 4?").await.expect("report");

    assert_eq!(report.reply.content(), "That works out to 12.");
    assert_eq!(report.tool_calls, 1);
    assert_eq!(report.safety.map(|safety| safety.verdict), Some(SafetyVerdict::Safe));

    let history = graph.history(&thread_id).await.expect("history");
    assert_eq!(history[3], Message::tool("call-7", "Calculator", "12"));

    let requests = mock.requests.all();
    let models = requests.iter().map(|request| request.body["model"].clone()).collect::<Vec<_>>();
    assert_eq!(models, vec![json!("llama3.1"), json!("guard"), json!("llama3.1"), json!("guard")]);
    let guard_prompt = requests[1].body["messages"][0]["content"].as_str().expect("prompt");
    assert!(guard_prompt.contains("User: What is 3 * 4?"));
    assert!(requests[0].body["tools"][0]["function"]["name"] == "Calculator");
}

#[tokio::test]
async fn speech_client_transcribes_and_synthesizes() {
    let router = Router::new()
        .route("/v1/transcribe", post(|| async { Json(json!({ "text": " where is the station " })) }))
        .route(
            "/v1/synthesize",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["language"], "en");
                assert_eq!(body["speed"], 1.5);
                b"ID3-audio".to_vec()
            }),
        );
    let base_url = spawn(router).await;
    let client = SpeechClient::from_config(&SpeechConfig {
        base_url: Some(base_url),
        language: "en".into(),
        speed: 1.5,
        timeout_secs: 5,
    })
    .expect("speech client");

    assert_eq!(client.speech_to_text(b"RIFF....").await.as_deref(), Some("where is the station"));
    assert_eq!(
        client.text_to_speech("Stay safe", client.default_speed()).await,
        Some(b"ID3-audio".to_vec())
    );
}

#[tokio::test]
async fn speech_client_degrades_to_none_on_failure() {
    let router = Router::new()
        .route("/v1/transcribe", post(|| async { StatusCode::BAD_GATEWAY }))
        .route("/v1/synthesize", post(|| async { Vec::<u8>::new() }));
    let base_url = spawn(router).await;
    let client = SpeechClient::from_config(&SpeechConfig {
        base_url: Some(base_url),
        language: "en".into(),
        speed: 1.0,
        timeout_secs: 5,
    })
    .expect("speech client");

    assert_eq!(client.speech_to_text(b"RIFF").await, None);
    assert_eq!(client.text_to_speech("hi", 1.0).await, None);
}
