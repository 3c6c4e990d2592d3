//! Error types for the chat pipeline

use thiserror::Error;

/// Result type alias for chat pipeline operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can occur while streaming, persisting, or speaking a chat exchange.
///
/// Every variant is recovered at the component that detects it; none of them is
/// meant to escape to the UI as a crash.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Non-2xx status or network failure while opening or reading the stream.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame that could not be decoded. The line is skipped.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server sent an explicit `error` event.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A message-store write failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Title generation error: {0}")]
    Title(String),

    /// A second exchange was submitted while one is still in flight.
    #[error("An exchange is already in flight")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ChatError {
    /// True for failures that replace the in-progress answer with the canned failure text.
    pub fn replaces_answer(&self) -> bool {
        matches!(self, ChatError::Transport(_) | ChatError::Upstream(_) | ChatError::Http(_))
    }
}

impl From<config::ConfigError> for ChatError {
    fn from(err: config::ConfigError) -> Self {
        ChatError::Config(err.to_string())
    }
}
