//! **Speech synthesis** — turn message text into audio bytes for playback.
//!
//! Implement `SpeechSynthesizer` for any text-to-speech backend. The HTTP backend
//! posts to the product's synthesis endpoint with fixed low-latency tuning.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MODEL_ID: &str = "eleven_flash_v2_5";

/// Tuning sent with every synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl VoiceSettings {
    /// Favors time-to-first-audio over fidelity.
    pub const LOW_LATENCY: VoiceSettings = VoiceSettings {
        stability: 0.5,
        similarity_boost: 0.75,
        style: 0.0,
        use_speaker_boost: true,
    };
}

/// Streaming latency optimization level requested from the backend (0 = off, 4 = max).
pub const OPTIMIZE_STREAMING_LATENCY: u8 = 3;

/// Backend that turns text into audio bytes (MP3/WAV).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice_id`. Return an empty vec to skip playback.
    async fn synthesize(&self, text: &str, voice_id: &str) -> VoiceResult<Vec<u8>>;
}

/// Placeholder synthesizer: returns empty audio so nothing plays.
#[derive(Debug, Default)]
pub struct PlaceholderSynthesizer;

#[async_trait]
impl SpeechSynthesizer for PlaceholderSynthesizer {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
    optimize_streaming_latency: u8,
}

/// Synthesis over the product's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    /// Full endpoint URL.
    pub url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    pub model_id: String,
    client: reqwest::Client,
}

impl HttpSpeechSynthesizer {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            api_key,
            model_id: DEFAULT_MODEL_ID.to_string(),
            client,
        })
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let body = SynthesisRequest {
            text,
            voice_id,
            model_id: &self.model_id,
            voice_settings: VoiceSettings::LOW_LATENCY,
            optimize_streaming_latency: OPTIMIZE_STREAMING_LATENCY,
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        debug!(target: "persona::voice", voice_id, bytes = bytes.len(), "synthesized clip");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_returns_empty() {
        let out = PlaceholderSynthesizer.synthesize("hello", "v1").await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn request_body_carries_low_latency_settings() {
        let body = SynthesisRequest {
            text: "hi",
            voice_id: "v1",
            model_id: DEFAULT_MODEL_ID,
            voice_settings: VoiceSettings::LOW_LATENCY,
            optimize_streaming_latency: OPTIMIZE_STREAMING_LATENCY,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["voice_settings"]["similarity_boost"], 0.75);
        assert_eq!(v["voice_settings"]["use_speaker_boost"], true);
        assert_eq!(v["optimize_streaming_latency"], 3);
    }
}
