//! Error types for the persona voice layer

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Engine-reported capture failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorCode {
    PermissionDenied,
    NoSpeech,
    Network,
    Aborted,
    Other,
}

impl CaptureErrorCode {
    /// Map a platform error string (e.g. `not-allowed`, `no-speech`) to a code.
    pub fn from_platform(code: &str) -> Self {
        match code.trim() {
            "not-allowed" | "service-not-allowed" | "permission-denied" => Self::PermissionDenied,
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "aborted" => Self::Aborted,
            _ => Self::Other,
        }
    }

    /// Message shown to the user when capture stops because of this code.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Microphone access was denied. Please allow microphone access to use voice input."
            }
            Self::NoSpeech => "No speech was detected. Please try again.",
            Self::Network => "Voice input needs a network connection. Please check your connection.",
            Self::Aborted => "Voice input was stopped.",
            Self::Other => "Voice input is unavailable right now.",
        }
    }
}

impl std::fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PermissionDenied => "permission-denied",
            Self::NoSpeech => "no-speech",
            Self::Network => "network",
            Self::Aborted => "aborted",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in the voice layer
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Capture error: {0}")]
    Capture(CaptureErrorCode),

    #[error("Capture engine error: {0}")]
    Engine(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
