//! Chat pipeline configuration.
//!
//! Loaded with the `config` crate: built-in defaults, then an optional TOML file
//! (`PERSONA_CONFIG`, default `config/persona`), then `PERSONA__*` environment
//! variables. `ChatConfig::from_env()` reads plain env vars for binaries that skip the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ChatResult;
use crate::types::DEFAULT_PLACEHOLDER;

const DEFAULT_COMPLETION_URL: &str = "http://localhost:8000/api/chat/stream";
const DEFAULT_TITLE_URL: &str = "http://localhost:8000/api/chat/title";
const DEFAULT_SYNTHESIS_URL: &str = "http://localhost:8000/api/tts";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_VOICE_ID: &str = "default";

fn default_completion_url() -> String {
    DEFAULT_COMPLETION_URL.to_string()
}

fn default_title_url() -> String {
    DEFAULT_TITLE_URL.to_string()
}

fn default_synthesis_url() -> String {
    DEFAULT_SYNTHESIS_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_voice_id() -> String {
    DEFAULT_VOICE_ID.to_string()
}

fn default_storage_path() -> String {
    "./data".to_string()
}

fn default_audio_cache_capacity() -> usize {
    10
}

fn default_assistant_append_delay_ms() -> u64 {
    100
}

fn default_ignore_window_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_stream_idle_timeout_secs() -> u64 {
    60
}

fn default_placeholder_text() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

/// Endpoints and tuning for one chat session.
///
/// | Env (`from_env`) | Default | Description |
/// |-----|---------|-------------|
/// | PERSONA_COMPLETION_URL | localhost stream endpoint | Streaming completion endpoint. |
/// | PERSONA_TITLE_URL | localhost title endpoint | Title-generation endpoint. |
/// | PERSONA_SYNTHESIS_URL | localhost tts endpoint | Speech-synthesis endpoint. |
/// | PERSONA_USAGE_URL | unset | Usage tracking endpoint; unset disables tracking. |
/// | PERSONA_API_KEY | unset | Bearer token sent to every endpoint. |
/// | PERSONA_MODEL | gpt-4o-mini | Model requested from the completion endpoint. |
/// | PERSONA_VOICE_ID | default | Voice used for playback. |
/// | PERSONA_STORAGE_PATH | ./data | Base directory for the sled message store. |
/// | PERSONA_CONNECT_TIMEOUT_SECS | 10 | Connect limit for the completion endpoint. |
/// | PERSONA_STREAM_IDLE_TIMEOUT_SECS | 60 | Max gap between completion stream chunks. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_completion_url")]
    pub completion_url: String,
    #[serde(default = "default_title_url")]
    pub title_url: String,
    #[serde(default = "default_synthesis_url")]
    pub synthesis_url: String,
    #[serde(default)]
    pub usage_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Maximum number of synthesized clips kept resident.
    #[serde(default = "default_audio_cache_capacity")]
    pub audio_cache_capacity: usize,
    /// Minimum gap between the durable user append and the assistant append.
    #[serde(default = "default_assistant_append_delay_ms")]
    pub assistant_append_delay_ms: u64,
    /// How long capture results are discarded after a message is sent.
    #[serde(default = "default_ignore_window_ms")]
    pub ignore_window_ms: u64,
    /// Whole-request limit for title, usage and synthesis calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two chunks of a completion stream. The
    /// stream as a whole has no deadline.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            completion_url: default_completion_url(),
            title_url: default_title_url(),
            synthesis_url: default_synthesis_url(),
            usage_url: None,
            api_key: None,
            model: default_model(),
            voice_id: default_voice_id(),
            storage_path: default_storage_path(),
            audio_cache_capacity: default_audio_cache_capacity(),
            assistant_append_delay_ms: default_assistant_append_delay_ms(),
            ignore_window_ms: default_ignore_window_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            placeholder_text: default_placeholder_text(),
        }
    }
}

impl ChatConfig {
    /// Load from file and environment. Precedence: `PERSONA__*` env > `PERSONA_CONFIG` file > defaults.
    pub fn load() -> ChatResult<Self> {
        let config_path =
            std::env::var("PERSONA_CONFIG").unwrap_or_else(|_| "config/persona".to_string());
        let builder = config::Config::builder();

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder.add_source(config::File::with_name(&config_path).required(false))
        };

        let built = builder
            .add_source(config::Environment::with_prefix("PERSONA").separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Read flat `PERSONA_*` environment variables. Unset or invalid => defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            completion_url: env_string("PERSONA_COMPLETION_URL").unwrap_or(defaults.completion_url),
            title_url: env_string("PERSONA_TITLE_URL").unwrap_or(defaults.title_url),
            synthesis_url: env_string("PERSONA_SYNTHESIS_URL").unwrap_or(defaults.synthesis_url),
            usage_url: env_string("PERSONA_USAGE_URL"),
            api_key: env_string("PERSONA_API_KEY"),
            model: env_string("PERSONA_MODEL").unwrap_or(defaults.model),
            voice_id: env_string("PERSONA_VOICE_ID").unwrap_or(defaults.voice_id),
            storage_path: env_string("PERSONA_STORAGE_PATH").unwrap_or(defaults.storage_path),
            audio_cache_capacity: env_parse("PERSONA_AUDIO_CACHE_CAPACITY", defaults.audio_cache_capacity)
                .max(1),
            assistant_append_delay_ms: env_parse(
                "PERSONA_ASSISTANT_APPEND_DELAY_MS",
                defaults.assistant_append_delay_ms,
            ),
            ignore_window_ms: env_parse("PERSONA_IGNORE_WINDOW_MS", defaults.ignore_window_ms),
            request_timeout_secs: env_parse("PERSONA_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            connect_timeout_secs: env_parse("PERSONA_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            stream_idle_timeout_secs: env_parse(
                "PERSONA_STREAM_IDLE_TIMEOUT_SECS",
                defaults.stream_idle_timeout_secs,
            ),
            placeholder_text: env_string("PERSONA_PLACEHOLDER_TEXT").unwrap_or(defaults.placeholder_text),
        }
    }

    pub fn assistant_append_delay(&self) -> Duration {
        Duration::from_millis(self.assistant_append_delay_ms)
    }

    pub fn ignore_window(&self) -> Duration {
        Duration::from_millis(self.ignore_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}
