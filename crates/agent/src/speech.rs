use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use safepath_core::config::SpeechConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
enum SpeechError {
    #[error("speech service is not configured")]
    NotConfigured,
    #[error("speech request failed: {0}")]
    Transport(String),
    #[error("speech service returned status {0}")]
    Status(u16),
    #[error("speech service returned an empty result")]
    Empty,
}

/// Client for an external transcription and synthesis service.
/// Every operation degrades to `None` and logs a warning on failure.
pub struct SpeechClient {
    base_url: Option<String>,
    language: String,
    default_speed: f32,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    language: &'a str,
    speed: f32,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
}

impl SpeechClient {
    pub fn from_config(config: &SpeechConfig) -> Result<Self, reqwest::Error> {
        let http =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            base_url: config.base_url.as_ref().map(|url| url.trim_end_matches('/').to_string()),
            language: config.language.clone(),
            default_speed: config.speed,
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn default_speed(&self) -> f32 {
        self.default_speed
    }

    pub async fn speech_to_text(&self, audio: &[u8]) -> Option<String> {
        match self.transcribe(audio).await {
            Ok(text) => Some(text),
            Err(error) => {
                warn!(event_name = "agent.speech.transcribe_failed", error = %error, "speech to text failed");
                None
            }
        }
    }

    pub async fn text_to_speech(&self, text: &str, speed: f32) -> Option<Vec<u8>> {
        match self.synthesize(text, speed).await {
            Ok(audio) => Some(audio),
            Err(error) => {
                warn!(event_name = "agent.speech.synthesize_failed", error = %error, "text to speech failed");
                None
            }
        }
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String, SpeechError> {
        let base_url = self.base_url.as_deref().ok_or(SpeechError::NotConfigured)?;
        let response = self
            .http
            .post(format!("{base_url}/v1/transcribe"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|error| SpeechError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Status(response.status().as_u16()));
        }

        let payload: TranscribeResponse =
            response.json().await.map_err(|error| SpeechError::Transport(error.to_string()))?;
        let text = payload.text.trim();
        if text.is_empty() {
            return Err(SpeechError::Empty);
        }
        Ok(text.to_string())
    }

    async fn synthesize(&self, text: &str, speed: f32) -> Result<Vec<u8>, SpeechError> {
        let base_url = self.base_url.as_deref().ok_or(SpeechError::NotConfigured)?;
        let body = SynthesizeRequest { text, language: &self.language, speed };
        let response = self
            .http
            .post(format!("{base_url}/v1/synthesize"))
            .json(&body)
            .send()
            .await
            .map_err(|error| SpeechError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Status(response.status().as_u16()));
        }

        let audio =
            response.bytes().await.map_err(|error| SpeechError::Transport(error.to_string()))?;
        if audio.is_empty() {
            return Err(SpeechError::Empty);
        }
        Ok(audio.to_vec())
    }
}

/// Inline HTML player for MP3 bytes. Empty input yields an empty string.
pub fn audio_player_html(audio: &[u8]) -> String {
    if audio.is_empty() {
        return String::new();
    }
    format!(
        "<audio controls>\n    <source src=\"data:audio/mp3;base64,{}\" type=\"audio/mp3\">\n</audio>",
        STANDARD.encode(audio)
    )
}
