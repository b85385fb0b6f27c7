use std::path::Path;
use std::time::Duration;

use safepath_agent::guardrails::LlamaGuard;
use safepath_agent::llm::OpenAiCompatibleClient;
use safepath_agent::speech::SpeechClient;
use safepath_agent::AgentRegistry;
use safepath_core::config::AppConfig;
use serde::Serialize;

use crate::commands::{load_options, CommandResult};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const EXIT_DOCTOR_FAILED: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_DOCTOR_FAILED };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

const DEPENDENT_CHECKS: [&str; 5] =
    ["agent_construction", "chat_model", "backend", "safety_guard", "speech_service"];

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(load_options(config_path)) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_agent_construction(&config));
            checks.extend(probe_services(&config));
            checks.push(check_guard(&config));
            checks.push(check_speech(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_agent_construction(config: &AppConfig) -> DoctorCheck {
    match AgentRegistry::from_config(config) {
        Ok(registry) => {
            let tools = registry
                .graph(registry.default_key())
                .map(|graph| graph.tools().names().join(", "))
                .unwrap_or_default();
            DoctorCheck::pass(
                "agent_construction",
                format!("default agent `{}` with tools [{tools}]", registry.default_key()),
            )
        }
        Err(error) => DoctorCheck::fail("agent_construction", error.to_string()),
    }
}

fn probe_services(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck::fail("chat_model", details.clone()),
                DoctorCheck::fail("backend", details),
            ];
        }
    };

    let http = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(http) => http,
        Err(error) => {
            let details = format!("failed to build HTTP client: {error}");
            return vec![
                DoctorCheck::fail("chat_model", details.clone()),
                DoctorCheck::fail("backend", details),
            ];
        }
    };

    let model_url = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => format!("{}/v1/models", client.base_url()),
        Err(error) => return vec![DoctorCheck::fail("chat_model", error.to_string())],
    };
    let backend_url = config.backend_base_url().map(str::to_string);

    runtime.block_on(async {
        let chat_model = probe(&http, "chat_model", &model_url).await;
        let backend = match backend_url {
            Ok(url) => probe(&http, "backend", &url).await,
            Err(error) => DoctorCheck::fail("backend", error.to_string()),
        };
        vec![chat_model, backend]
    })
}

/// Any HTTP answer below 500 counts as reachable; auth is not checked.
async fn probe(http: &reqwest::Client, name: &'static str, url: &str) -> DoctorCheck {
    match http.get(url).send().await {
        Ok(response) if !response.status().is_server_error() => {
            DoctorCheck::pass(name, format!("`{url}` answered {}", response.status().as_u16()))
        }
        Ok(response) => {
            DoctorCheck::fail(name, format!("`{url}` answered {}", response.status().as_u16()))
        }
        Err(error) => DoctorCheck::fail(name, format!("`{url}` unreachable: {error}")),
    }
}

fn check_guard(config: &AppConfig) -> DoctorCheck {
    match LlamaGuard::from_config(&config.guard) {
        Ok(guard) if guard.is_enabled() => {
            DoctorCheck::pass("safety_guard", format!("enabled with model `{}`", config.guard.model))
        }
        Ok(_) => DoctorCheck::skipped(
            "safety_guard",
            "disabled: set SAFEPATH_GUARD_API_KEY or GROQ_API_KEY to screen replies",
        ),
        Err(error) => DoctorCheck::fail("safety_guard", error.to_string()),
    }
}

fn check_speech(config: &AppConfig) -> DoctorCheck {
    match SpeechClient::from_config(&config.speech) {
        Ok(client) if client.is_configured() => DoctorCheck::pass(
            "speech_service",
            format!(
                "configured for language `{}` at speed {}",
                config.speech.language, config.speech.speed
            ),
        ),
        Ok(_) => DoctorCheck::skipped("speech_service", "speech.base_url is not set"),
        Err(error) => DoctorCheck::fail("speech_service", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
