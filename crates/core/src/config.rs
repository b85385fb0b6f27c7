use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::persona::Persona;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub guard: GuardConfig,
    pub backend: BackendConfig,
    pub services: ServicesConfig,
    pub speech: SpeechConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Content-safety classifier. Disabled when no API key is configured.
#[derive(Clone, Debug)]
pub struct GuardConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub api_token: SecretString,
    pub user_id: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServicesConfig {
    pub geolocation_url: String,
    pub search_url: String,
    pub search_max_results: usize,
}

#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub base_url: Option<String>,
    pub language: String,
    pub speed: f32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub step_budget: u32,
    pub idle_eviction_secs: u64,
    pub instructions: InstructionOverrides,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstructionOverrides {
    pub base: Option<String>,
    pub personas: BTreeMap<Persona, String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub backend_api_token: Option<String>,
    pub backend_user_id: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub step_budget: Option<u32>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILE: &str = "safepath.toml";
pub const NESTED_CONFIG_FILE: &str = "config/safepath.toml";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                temperature: 0.5,
                timeout_secs: 60,
                max_retries: 2,
            },
            guard: GuardConfig {
                api_key: None,
                base_url: "https://api.groq.com/openai".to_string(),
                model: "meta-llama/llama-guard-4-12b".to_string(),
                timeout_secs: 30,
            },
            backend: BackendConfig {
                base_url: None,
                api_token: String::new().into(),
                user_id: String::new(),
                timeout_secs: 30,
            },
            services: ServicesConfig {
                geolocation_url: "https://ipinfo.io/json".to_string(),
                search_url: "https://api.duckduckgo.com/".to_string(),
                search_max_results: 4,
            },
            speech: SpeechConfig {
                base_url: None,
                language: "en".to_string(),
                speed: 1.5,
                timeout_secs: 30,
            },
            agent: AgentConfig {
                step_budget: 25,
                idle_eviction_secs: 3_600,
                instructions: InstructionOverrides::default(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The validated backend base URL without a trailing slash.
    pub fn backend_base_url(&self) -> Result<&str, ConfigError> {
        self.backend
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or_else(|| ConfigError::Validation("backend.base_url is required".to_string()))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(guard) = patch.guard {
            if let Some(guard_api_key_value) = guard.api_key {
                self.guard.api_key = Some(secret_value(guard_api_key_value));
            }
            if let Some(base_url) = guard.base_url {
                self.guard.base_url = base_url;
            }
            if let Some(model) = guard.model {
                self.guard.model = model;
            }
            if let Some(timeout_secs) = guard.timeout_secs {
                self.guard.timeout_secs = timeout_secs;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = Some(base_url);
            }
            if let Some(api_token_value) = backend.api_token {
                self.backend.api_token = secret_value(api_token_value);
            }
            if let Some(user_id) = backend.user_id {
                self.backend.user_id = user_id;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(services) = patch.services {
            if let Some(geolocation_url) = services.geolocation_url {
                self.services.geolocation_url = geolocation_url;
            }
            if let Some(search_url) = services.search_url {
                self.services.search_url = search_url;
            }
            if let Some(search_max_results) = services.search_max_results {
                self.services.search_max_results = search_max_results;
            }
        }

        if let Some(speech) = patch.speech {
            if let Some(base_url) = speech.base_url {
                self.speech.base_url = Some(base_url);
            }
            if let Some(language) = speech.language {
                self.speech.language = language;
            }
            if let Some(speed) = speech.speed {
                self.speech.speed = speed;
            }
            if let Some(timeout_secs) = speech.timeout_secs {
                self.speech.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(step_budget) = agent.step_budget {
                self.agent.step_budget = step_budget;
            }
            if let Some(idle_eviction_secs) = agent.idle_eviction_secs {
                self.agent.idle_eviction_secs = idle_eviction_secs;
            }
            if let Some(instructions) = agent.instructions {
                instructions.apply_to(&mut self.agent.instructions);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SAFEPATH_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SAFEPATH_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SAFEPATH_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SAFEPATH_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SAFEPATH_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("SAFEPATH_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("SAFEPATH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SAFEPATH_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SAFEPATH_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("SAFEPATH_LLM_MAX_RETRIES", &value)?;
        }

        let guard_api_key = read_env("SAFEPATH_GUARD_API_KEY").or_else(|| read_env("GROQ_API_KEY"));
        if let Some(value) = guard_api_key {
            self.guard.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SAFEPATH_GUARD_BASE_URL") {
            self.guard.base_url = value;
        }
        if let Some(value) = read_env("SAFEPATH_GUARD_MODEL") {
            self.guard.model = value;
        }
        if let Some(value) = read_env("SAFEPATH_GUARD_TIMEOUT_SECS") {
            self.guard.timeout_secs = parse_u64("SAFEPATH_GUARD_TIMEOUT_SECS", &value)?;
        }

        let backend_url = read_env("SAFEPATH_BACKEND_URL").or_else(|| read_env("BACKEND_URL"));
        if let Some(value) = backend_url {
            self.backend.base_url = Some(value);
        }
        if let Some(value) = read_env("SAFEPATH_BACKEND_API_TOKEN") {
            self.backend.api_token = secret_value(value);
        }
        if let Some(value) = read_env("SAFEPATH_BACKEND_USER_ID") {
            self.backend.user_id = value;
        }
        if let Some(value) = read_env("SAFEPATH_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("SAFEPATH_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SAFEPATH_SERVICES_GEOLOCATION_URL") {
            self.services.geolocation_url = value;
        }
        if let Some(value) = read_env("SAFEPATH_SERVICES_SEARCH_URL") {
            self.services.search_url = value;
        }
        if let Some(value) = read_env("SAFEPATH_SERVICES_SEARCH_MAX_RESULTS") {
            self.services.search_max_results =
                parse_usize("SAFEPATH_SERVICES_SEARCH_MAX_RESULTS", &value)?;
        }

        if let Some(value) = read_env("SAFEPATH_SPEECH_BASE_URL") {
            self.speech.base_url = Some(value);
        }
        if let Some(value) = read_env("SAFEPATH_SPEECH_LANGUAGE") {
            self.speech.language = value;
        }
        if let Some(value) = read_env("SAFEPATH_SPEECH_SPEED") {
            self.speech.speed = parse_f32("SAFEPATH_SPEECH_SPEED", &value)?;
        }

        if let Some(value) = read_env("SAFEPATH_AGENT_STEP_BUDGET") {
            self.agent.step_budget = parse_u32("SAFEPATH_AGENT_STEP_BUDGET", &value)?;
        }
        if let Some(value) = read_env("SAFEPATH_AGENT_IDLE_EVICTION_SECS") {
            self.agent.idle_eviction_secs =
                parse_u64("SAFEPATH_AGENT_IDLE_EVICTION_SECS", &value)?;
        }

        if let Some(value) = read_env("SAFEPATH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SAFEPATH_SERVER_PORT") {
            self.server.port = parse_u16("SAFEPATH_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SAFEPATH_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SAFEPATH_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("SAFEPATH_LOGGING_LEVEL").or_else(|| read_env("SAFEPATH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SAFEPATH_LOGGING_FORMAT").or_else(|| read_env("SAFEPATH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend_url) = overrides.backend_url {
            self.backend.base_url = Some(backend_url);
        }
        if let Some(api_token) = overrides.backend_api_token {
            self.backend.api_token = secret_value(api_token);
        }
        if let Some(user_id) = overrides.backend_user_id {
            self.backend.user_id = user_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(step_budget) = overrides.step_budget {
            self.agent.step_budget = step_budget;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_guard(&self.guard)?;
        validate_backend(&self.backend)?;
        validate_services(&self.services)?;
        validate_speech(&self.speech)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_guard(guard: &GuardConfig) -> Result<(), ConfigError> {
    validate_timeout("guard.timeout_secs", guard.timeout_secs)?;
    if !is_http_url(&guard.base_url) {
        return Err(ConfigError::Validation(
            "guard.base_url must start with http:// or https://".to_string(),
        ));
    }
    if guard.model.trim().is_empty() {
        return Err(ConfigError::Validation("guard.model must not be empty".to_string()));
    }
    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    let Some(base_url) = backend.base_url.as_deref() else {
        return Err(ConfigError::Validation(
            "backend.base_url is required (set SAFEPATH_BACKEND_URL or BACKEND_URL)".to_string(),
        ));
    };
    if !is_http_url(base_url) {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "backend.api_token is required (set SAFEPATH_BACKEND_API_TOKEN)".to_string(),
        ));
    }

    if backend.user_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "backend.user_id is required for SOS alerts (set SAFEPATH_BACKEND_USER_ID)"
                .to_string(),
        ));
    }

    validate_timeout("backend.timeout_secs", backend.timeout_secs)
}

fn validate_services(services: &ServicesConfig) -> Result<(), ConfigError> {
    if !is_http_url(&services.geolocation_url) {
        return Err(ConfigError::Validation(
            "services.geolocation_url must start with http:// or https://".to_string(),
        ));
    }
    if !is_http_url(&services.search_url) {
        return Err(ConfigError::Validation(
            "services.search_url must start with http:// or https://".to_string(),
        ));
    }
    if services.search_max_results == 0 || services.search_max_results > 10 {
        return Err(ConfigError::Validation(
            "services.search_max_results must be in range 1..=10".to_string(),
        ));
    }
    Ok(())
}

fn validate_speech(speech: &SpeechConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &speech.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "speech.base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    if !(speech.speed > 0.0 && speech.speed <= 4.0) {
        return Err(ConfigError::Validation("speech.speed must be in range (0.0, 4.0]".to_string()));
    }
    validate_timeout("speech.timeout_secs", speech.timeout_secs)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.step_budget < 2 {
        return Err(ConfigError::Validation(
            "agent.step_budget must be at least 2 to allow a tool round-trip".to_string(),
        ));
    }
    if agent.idle_eviction_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.idle_eviction_secs must be greater than zero".to_string(),
        ));
    }
    let blank_override = agent.instructions.base.iter().any(|text| text.trim().is_empty())
        || agent.instructions.personas.values().any(|text| text.trim().is_empty());
    if blank_override {
        return Err(ConfigError::Validation(
            "agent.instructions overrides must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    guard: Option<GuardPatch>,
    backend: Option<BackendPatch>,
    services: Option<ServicesPatch>,
    speech: Option<SpeechPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    user_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicesPatch {
    geolocation_url: Option<String>,
    search_url: Option<String>,
    search_max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechPatch {
    base_url: Option<String>,
    language: Option<String>,
    speed: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    step_budget: Option<u32>,
    idle_eviction_secs: Option<u64>,
    instructions: Option<InstructionsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct InstructionsPatch {
    base: Option<String>,
    location: Option<String>,
    emergency: Option<String>,
    companion: Option<String>,
    nearby_places: Option<String>,
    get_route: Option<String>,
}

impl InstructionsPatch {
    fn apply_to(self, target: &mut InstructionOverrides) {
        if let Some(base) = self.base {
            target.base = Some(base);
        }
        let sections = [
            (Persona::Location, self.location),
            (Persona::Emergency, self.emergency),
            (Persona::Companion, self.companion),
            (Persona::NearbyPlaces, self.nearby_places),
            (Persona::GetRoute, self.get_route),
        ];
        for (persona, text) in sections {
            if let Some(text) = text {
                target.personas.insert(persona, text);
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
