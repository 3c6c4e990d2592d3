//! Shared chat types: messages, attachments, tool-call records, citations, and stream events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text shown in place of an answer when the stream could not be opened or the
/// upstream reported an error.
pub const FAILURE_MESSAGE: &str =
    "Sorry, I couldn't generate a response right now. Please try again.";

/// Default placeholder shown before the first streamed token arrives.
pub const DEFAULT_PLACEHOLDER: &str = "Thinking...";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

/// File metadata attached to a user message (the bytes live in object storage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A tool invocation made by the assistant while answering (e.g. a knowledge-base lookup).
///
/// Decoding never fails on an object: fields of an unexpected shape are kept in
/// `extra` instead of being interpreted. An OpenAI-style `"function": {"name": ..}`
/// yields the name, with the original object kept under `function_call`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct ToolCallRecord {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_count: Option<u64>,
    /// Backend-specific fields we do not interpret but must round-trip to the store.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for ToolCallRecord {
    fn from(mut raw: Map<String, Value>) -> Self {
        let function = match raw.remove("function") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(Value::Object(call)) => {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                raw.insert("function_call".to_string(), Value::Object(call));
                name
            }
            Some(other) => {
                raw.insert("function_call".to_string(), other);
                String::new()
            }
        };
        let query = take_string(&mut raw, "query");
        let results_count = take_u64(&mut raw, "results_count");
        Self {
            function,
            query,
            results_count,
            extra: raw,
        }
    }
}

impl ToolCallRecord {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>, results_count: u64) -> Self {
        self.query = Some(query.into());
        self.results_count = Some(results_count);
        self
    }
}

/// A knowledge source cited by the assistant. Decoded as leniently as [`ToolCallRecord`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct SourceCitation {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for SourceCitation {
    fn from(mut raw: Map<String, Value>) -> Self {
        let title = match raw.remove("title") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            Some(other) => {
                raw.insert("title_raw".to_string(), other);
                String::new()
            }
        };
        let url = take_string(&mut raw, "url");
        let snippet = take_string(&mut raw, "snippet");
        let score = take_f64(&mut raw, "score");
        Self {
            title,
            url,
            snippet,
            score,
            extra: raw,
        }
    }
}

// Field readers for loosely typed backend metadata. A value that cannot be read
// is put back under its key so it still round-trips through `extra`.

fn take_string(raw: &mut Map<String, Value>, key: &str) -> Option<String> {
    match raw.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        other => {
            raw.insert(key.to_string(), other);
            None
        }
    }
}

fn take_u64(raw: &mut Map<String, Value>, key: &str) -> Option<u64> {
    let parsed = match raw.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if parsed.is_some() || raw.get(key).is_some_and(Value::is_null) {
        raw.remove(key);
    }
    parsed
}

fn take_f64(raw: &mut Map<String, Value>, key: &str) -> Option<f64> {
    let parsed = match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if parsed.is_some() || raw.get(key).is_some_and(Value::is_null) {
        raw.remove(key);
    }
    parsed
}

impl SourceCitation {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// One message in the live chat view.
///
/// Text is mutable only while `is_streaming` is true; once the terminal stream event
/// has been folded in, the message is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileAttachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceCitation>>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    /// A finished user message, as created on submit.
    pub fn user(text: impl Into<String>, files: Vec<FileAttachment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
            files: if files.is_empty() { None } else { Some(files) },
            tool_calls: None,
            sources: None,
            is_streaming: false,
        }
    }

    /// An agent message that is still being streamed, showing `placeholder` until the first token.
    pub fn streaming_agent(placeholder: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Agent,
            text: placeholder.into(),
            created_at: Utc::now(),
            files: None,
            tool_calls: None,
            sources: None,
            is_streaming: true,
        }
    }
}

/// Payload of the terminal `done` frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DonePayload {
    #[serde(default)]
    pub full_response: String,
    #[serde(default)]
    pub tool_calls_made: Vec<ToolCallRecord>,
    #[serde(default)]
    pub sources: Vec<SourceCitation>,
}

/// A typed event decoded from one `data:` frame of the completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Content(String),
    Sources(Vec<SourceCitation>),
    ToolCalls(Vec<ToolCallRecord>),
    Done(DonePayload),
    Error { message: String },
}

/// Final result of assembling one streamed reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub sources: Vec<SourceCitation>,
}
