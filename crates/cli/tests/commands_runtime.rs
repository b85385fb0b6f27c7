use std::env;
use std::fs;
use std::sync::{Arc, Mutex, OnceLock};

use axum::routing::post;
use axum::Router;
use chrono::NaiveDate;
use safepath_agent::instructions::InstructionSet;
use safepath_agent::speech::SpeechClient;
use safepath_agent::supervisor::GREETING;
use safepath_agent::testing::{ScriptedModel, StaticGuard};
use safepath_agent::tools::ToolRegistry;
use safepath_agent::AgentGraph;
use safepath_cli::commands::chat::{chat_session, Narrator};
use safepath_cli::commands::{agents, classify, config, doctor};
use safepath_core::config::SpeechConfig;
use safepath_core::domain::message::Message;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

const VALID_BACKEND: [(&str, &str); 3] = [
    ("SAFEPATH_BACKEND_URL", "http://127.0.0.1:9"),
    ("SAFEPATH_BACKEND_API_TOKEN", "sb-secret-token"),
    ("SAFEPATH_BACKEND_USER_ID", "traveller-7"),
];

#[test]
fn classify_prefers_emergency_over_location() {
    let result = classify::run("I feel unsafe, there's a threat in this area");
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "classify");
    assert_eq!(payload["persona"], "emergency");
}

#[test]
fn classify_defaults_to_companion() {
    let payload = parse_payload(&classify::run("Just chatting, how are you?").output);
    assert_eq!(payload["persona"], "companion");
}

#[test]
fn classify_rejects_blank_text() {
    let result = classify::run("   ");
    assert_eq!(result.exit_code, 1);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn agents_lists_travel_assistant_with_valid_env() {
    with_env(&VALID_BACKEND, || {
        let result = agents::run(None);
        assert_eq!(result.exit_code, 0, "expected agent listing to succeed");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["default_agent"], "travel-chatbot-assistant");
        assert_eq!(payload["agents"][0]["key"], "travel-chatbot-assistant");
        assert_eq!(payload["agents"][0]["description"], "A travel chatbot assistant");
    });
}

#[test]
fn agents_returns_config_failure_without_backend() {
    with_env(&[], || {
        let result = agents::run(None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("backend.base_url"));
    });
}

#[test]
fn config_redacts_secrets_and_names_env_sources() {
    with_env(
        &[
            ("BACKEND_URL", "http://legacy.backend.test"),
            ("SAFEPATH_BACKEND_API_TOKEN", "sb-secret-token"),
            ("SAFEPATH_BACKEND_USER_ID", "traveller-7"),
            ("GROQ_API_KEY", "gsk_plainsecret"),
        ],
        || {
            let output = config::run(None);

            assert!(output.contains(
                "- backend.base_url = http://legacy.backend.test (source: env (BACKEND_URL))"
            ));
            assert!(output.contains(
                "- backend.api_token = sb-*** (source: env (SAFEPATH_BACKEND_API_TOKEN))"
            ));
            assert!(output.contains("- guard.api_key = <redacted> (source: env (GROQ_API_KEY))"));
            assert!(output.contains("- llm.api_key = <unset> (source: default)"));
            assert!(!output.contains("secret-token"));
            assert!(!output.contains("plainsecret"));
        },
    );
}

#[test]
fn config_attributes_values_to_explicit_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("safepath.toml");
    fs::write(
        &path,
        "[backend]\nbase_url = \"https://maps.example\"\napi_token = \"file-token\"\nuser_id = \"u-1\"\n\n[llm]\nmodel = \"mistral\"\n",
    )
    .expect("write config");

    with_env(&[], || {
        let output = config::run(Some(path.as_path()));
        let source = format!("(source: file ({}))", path.display());

        assert!(output.contains(&format!("- llm.model = mistral {source}")));
        assert!(output.contains(&format!("- backend.base_url = https://maps.example {source}")));
        assert!(output.contains("- agent.step_budget = 25 (source: default)"));
    });
}

#[test]
fn config_reports_missing_explicit_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("absent.toml");

    with_env(&VALID_BACKEND, || {
        let output = config::run(Some(path.as_path()));
        assert!(output.starts_with("config validation failed:"));
    });
}

#[test]
fn doctor_reports_unreachable_services_and_disabled_extras() {
    with_env(
        &[
            VALID_BACKEND[0],
            VALID_BACKEND[1],
            VALID_BACKEND[2],
            ("SAFEPATH_LLM_BASE_URL", "http://127.0.0.1:9"),
        ],
        || {
            let result = doctor::run(None, true);
            assert_eq!(result.exit_code, 5, "expected doctor failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["overall_status"], "fail");
            assert_eq!(check_status(&payload, "config_validation"), "pass");
            assert_eq!(check_status(&payload, "agent_construction"), "pass");
            assert_eq!(check_status(&payload, "chat_model"), "fail");
            assert_eq!(check_status(&payload, "backend"), "fail");
            assert_eq!(check_status(&payload, "safety_guard"), "skipped");
            assert_eq!(check_status(&payload, "speech_service"), "skipped");
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_invalid() {
    with_env(&[], || {
        let result = doctor::run(None, false);
        assert_eq!(result.exit_code, 5);

        let lines = result.output.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "doctor: one or more readiness checks failed");
        assert!(lines[1].starts_with("- [fail] config_validation:"));
        assert!(lines[2..].iter().all(|line| line.starts_with("- [skip] ")));
        assert_eq!(lines.len(), 7);
    });
}

#[tokio::test]
async fn chat_session_greets_answers_and_stops_at_exit_word() {
    let model =
        Arc::new(ScriptedModel::with_replies(vec![Message::assistant("Try the main road.")]));
    let graph = AgentGraph::new(
        model.clone(),
        Arc::new(StaticGuard::safe()),
        InstructionSet::new(NaiveDate::from_ymd_opt(2025, 2, 1).expect("date")),
        ToolRegistry::default(),
        6,
    );
    let input: &[u8] = b"What is the safest destination route?\n\n  quit \nnever read\n";
    let mut output = Vec::new();

    let summary = chat_session(&graph, input, &mut output, None).await.expect("session");

    let transcript = String::from_utf8(output).expect("utf8");
    assert!(transcript.starts_with(&format!("assistant> {GREETING}\n")));
    assert!(transcript.contains("you> assistant> Try the main road.\n"));
    assert_eq!(summary.turns, 1);
    assert_eq!(summary.failed_turns, 0);
    assert_eq!(model.request_count(), 1);

    let history = graph.history(&summary.thread_id).await.expect("history");
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn chat_session_reports_failed_turns_inline() {
    let graph = AgentGraph::new(
        Arc::new(ScriptedModel::default()),
        Arc::new(StaticGuard::safe()),
        InstructionSet::new(NaiveDate::from_ymd_opt(2025, 2, 1).expect("date")),
        ToolRegistry::default(),
        6,
    );
    let input: &[u8] = b"hello\n";
    let mut output = Vec::new();

    let summary = chat_session(&graph, input, &mut output, None).await.expect("session");

    let transcript = String::from_utf8(output).expect("utf8");
    assert!(transcript.contains("error> chat model failed:"));
    assert_eq!(summary.failed_turns, 1);
}

#[tokio::test]
async fn narrator_writes_one_audio_player_per_spoken_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind speech mock");
    let address = listener.local_addr().expect("speech mock address");
    let router = Router::new().route("/v1/synthesize", post(|| async { b"ID3-audio".to_vec() }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let speech = SpeechClient::from_config(&SpeechConfig {
        base_url: Some(format!("http://{address}")),
        language: "en".to_string(),
        speed: 1.0,
        timeout_secs: 5,
    })
    .expect("speech client");
    let dir = TempDir::new().expect("temp dir");
    let mut narrator = Narrator::new(speech, dir.path());

    let first = narrator.speak("Stay on the main road.").await.expect("speak").expect("audio path");
    let second = narrator.speak("You have arrived.").await.expect("speak").expect("audio path");

    assert_eq!(first, dir.path().join("reply-001.html"));
    assert_eq!(second, dir.path().join("reply-002.html"));
    let html = fs::read_to_string(&first).expect("read player");
    assert!(html.starts_with("<audio controls>"));
    assert!(html.contains("data:audio/mp3;base64,SUQzLWF1ZGlv"));
}

fn check_status(payload: &Value, name: &str) -> String {
    payload["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SAFEPATH_LLM_PROVIDER",
        "SAFEPATH_LLM_API_KEY",
        "SAFEPATH_LLM_BASE_URL",
        "SAFEPATH_LLM_MODEL",
        "SAFEPATH_LLM_TEMPERATURE",
        "SAFEPATH_LLM_TIMEOUT_SECS",
        "SAFEPATH_LLM_MAX_RETRIES",
        "SAFEPATH_GUARD_API_KEY",
        "GROQ_API_KEY",
        "SAFEPATH_GUARD_BASE_URL",
        "SAFEPATH_GUARD_MODEL",
        "SAFEPATH_GUARD_TIMEOUT_SECS",
        "SAFEPATH_BACKEND_URL",
        "BACKEND_URL",
        "SAFEPATH_BACKEND_API_TOKEN",
        "SAFEPATH_BACKEND_USER_ID",
        "SAFEPATH_BACKEND_TIMEOUT_SECS",
        "SAFEPATH_SERVICES_GEOLOCATION_URL",
        "SAFEPATH_SERVICES_SEARCH_URL",
        "SAFEPATH_SERVICES_SEARCH_MAX_RESULTS",
        "SAFEPATH_SPEECH_BASE_URL",
        "SAFEPATH_SPEECH_LANGUAGE",
        "SAFEPATH_SPEECH_SPEED",
        "SAFEPATH_AGENT_STEP_BUDGET",
        "SAFEPATH_AGENT_IDLE_EVICTION_SECS",
        "SAFEPATH_SERVER_BIND_ADDRESS",
        "SAFEPATH_SERVER_PORT",
        "SAFEPATH_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SAFEPATH_LOGGING_LEVEL",
        "SAFEPATH_LOGGING_FORMAT",
        "SAFEPATH_LOG_LEVEL",
        "SAFEPATH_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
