use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use safepath_core::config::{resolve_config_path, AppConfig};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::load_options;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key_path: &'static str, env_keys: &'static [&'static str], value: impl ToString) -> Self {
        Self { key_path, env_keys, value: value.to_string() }
    }
}

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let llm = &config.llm;
    let guard = &config.guard;
    let backend = &config.backend;
    let services = &config.services;
    let speech = &config.speech;
    let agent = &config.agent;
    let server = &config.server;

    vec![
        Field::new("llm.provider", &["SAFEPATH_LLM_PROVIDER"], format!("{:?}", llm.provider).to_lowercase()),
        Field::new("llm.model", &["SAFEPATH_LLM_MODEL"], &llm.model),
        Field::new("llm.base_url", &["SAFEPATH_LLM_BASE_URL"], llm.base_url.as_deref().unwrap_or("<unset>")),
        Field::new("llm.api_key", &["SAFEPATH_LLM_API_KEY"], redact_optional(llm.api_key.as_ref())),
        Field::new("llm.temperature", &["SAFEPATH_LLM_TEMPERATURE"], llm.temperature),
        Field::new("llm.timeout_secs", &["SAFEPATH_LLM_TIMEOUT_SECS"], llm.timeout_secs),
        Field::new("llm.max_retries", &["SAFEPATH_LLM_MAX_RETRIES"], llm.max_retries),
        Field::new(
            "guard.api_key",
            &["SAFEPATH_GUARD_API_KEY", "GROQ_API_KEY"],
            redact_optional(guard.api_key.as_ref()),
        ),
        Field::new("guard.base_url", &["SAFEPATH_GUARD_BASE_URL"], &guard.base_url),
        Field::new("guard.model", &["SAFEPATH_GUARD_MODEL"], &guard.model),
        Field::new("guard.timeout_secs", &["SAFEPATH_GUARD_TIMEOUT_SECS"], guard.timeout_secs),
        Field::new(
            "backend.base_url",
            &["SAFEPATH_BACKEND_URL", "BACKEND_URL"],
            backend.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "backend.api_token",
            &["SAFEPATH_BACKEND_API_TOKEN"],
            redact_token(backend.api_token.expose_secret()),
        ),
        Field::new("backend.user_id", &["SAFEPATH_BACKEND_USER_ID"], &backend.user_id),
        Field::new("backend.timeout_secs", &["SAFEPATH_BACKEND_TIMEOUT_SECS"], backend.timeout_secs),
        Field::new(
            "services.geolocation_url",
            &["SAFEPATH_SERVICES_GEOLOCATION_URL"],
            &services.geolocation_url,
        ),
        Field::new("services.search_url", &["SAFEPATH_SERVICES_SEARCH_URL"], &services.search_url),
        Field::new(
            "services.search_max_results",
            &["SAFEPATH_SERVICES_SEARCH_MAX_RESULTS"],
            services.search_max_results,
        ),
        Field::new(
            "speech.base_url",
            &["SAFEPATH_SPEECH_BASE_URL"],
            speech.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("speech.language", &["SAFEPATH_SPEECH_LANGUAGE"], &speech.language),
        Field::new("speech.speed", &["SAFEPATH_SPEECH_SPEED"], speech.speed),
        Field::new("agent.step_budget", &["SAFEPATH_AGENT_STEP_BUDGET"], agent.step_budget),
        Field::new(
            "agent.idle_eviction_secs",
            &["SAFEPATH_AGENT_IDLE_EVICTION_SECS"],
            agent.idle_eviction_secs,
        ),
        Field::new("server.bind_address", &["SAFEPATH_SERVER_BIND_ADDRESS"], &server.bind_address),
        Field::new("server.port", &["SAFEPATH_SERVER_PORT"], server.port),
        Field::new(
            "server.graceful_shutdown_secs",
            &["SAFEPATH_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            server.graceful_shutdown_secs,
        ),
        Field::new(
            "logging.level",
            &["SAFEPATH_LOGGING_LEVEL", "SAFEPATH_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["SAFEPATH_LOGGING_FORMAT", "SAFEPATH_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) => redact_token(secret.expose_secret()),
        None => "<unset>".to_string(),
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
