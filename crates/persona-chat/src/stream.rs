//! Stream Assembler: fold a newline-delimited `data: <json>` byte stream into a
//! live chat message.
//!
//! Bytes are buffered and split on raw `\n`, so a chunk boundary inside a
//! multi-byte character or a JSON payload never reaches the decoder. Observers
//! receive every intermediate message on a `watch` channel.

use futures_util::{Stream, StreamExt};
use persona_core::{
    ChatError, ChatMessage, ChatResult, DonePayload, SourceCitation, StreamEvent, StreamOutcome,
    ToolCallRecord, FAILURE_MESSAGE,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Keys a `tool_calls` payload may wrap its list under.
const TOOL_CALL_WRAPPERS: [&str; 3] = ["tool_calls", "tool_calls_made", "calls"];

/// Decode one line of the stream. Returns `None` for blank lines, non-`data:` lines,
/// the `[DONE]` sentinel, unknown event types, and undecodable payloads (logged).
pub fn parse_frame_line(line: &str) -> Option<StreamEvent> {
    let payload = data_payload(line)?;
    if payload == DONE_SENTINEL {
        return None;
    }
    match decode_payload(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(target: "persona::stream", "skipping frame: {}", e);
            None
        }
    }
}

fn data_payload(line: &str) -> Option<&str> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Decode a `data:` payload. Accepts `{"type": "<kind>", "<kind>": ...}` (payload
/// under the kind, or under `data`) and the untagged `{"<kind>": ...}` form.
fn decode_payload(payload: &str) -> ChatResult<Option<StreamEvent>> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ChatError::Protocol(format!("invalid JSON frame ({}): {}", e, payload)))?;
    let Some(obj) = value.as_object() else {
        return Err(ChatError::Protocol(format!("frame is not an object: {}", payload)));
    };

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => match ["content", "sources", "tool_calls", "done", "error"]
            .iter()
            .find(|k| obj.contains_key(**k))
        {
            Some(k) => k.to_string(),
            None => return Ok(None),
        },
    };
    let body = obj.get(&kind).or_else(|| obj.get("data"));

    let event = match kind.as_str() {
        "content" => {
            let text = match body {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => {
                    return Err(ChatError::Protocol(format!("content is not a string: {}", other)))
                }
            };
            StreamEvent::Content(text)
        }
        "sources" => StreamEvent::Sources(decode_list(body.cloned().unwrap_or(Value::Null))),
        "tool_calls" => StreamEvent::ToolCalls(decode_tool_calls(body.cloned().unwrap_or(Value::Null))),
        "done" => {
            let done = match body {
                Some(v @ Value::Object(_)) => v.clone(),
                _ => value.clone(),
            };
            StreamEvent::Done(decode_done(done))
        }
        "error" => StreamEvent::Error {
            message: error_message(obj, body),
        },
        other => {
            debug!(target: "persona::stream", kind = other, "ignoring unknown event type");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Decode a list of metadata records one element at a time. An element that is not
/// a record is skipped, so one odd entry never costs the rest of the frame. A bare
/// object is read as a one-element list.
fn decode_list<T: serde::de::DeserializeOwned>(value: Value) -> Vec<T> {
    let items = match value {
        Value::Null => return Vec::new(),
        Value::Array(items) => items,
        v @ Value::Object(_) => vec![v],
        other => {
            warn!(target: "persona::stream", "ignoring non-list metadata: {}", other);
            return Vec::new();
        }
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(target: "persona::stream", "skipping metadata entry: {}", e);
                None
            }
        })
        .collect()
}

fn decode_tool_calls(value: Value) -> Vec<ToolCallRecord> {
    if let Value::Object(ref map) = value {
        for key in TOOL_CALL_WRAPPERS {
            if let Some(inner) = map.get(key) {
                return decode_list(inner.clone());
            }
        }
    }
    decode_list(value)
}

/// Field-by-field `done` decoding: the completion signal is kept whatever shape
/// its metadata takes.
fn decode_done(value: Value) -> DonePayload {
    let Value::Object(mut obj) = value else {
        return DonePayload::default();
    };
    let full_response = match obj.remove("full_response") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    DonePayload {
        full_response,
        tool_calls_made: decode_tool_calls(obj.remove("tool_calls_made").unwrap_or(Value::Null)),
        sources: decode_list(obj.remove("sources").unwrap_or(Value::Null)),
    }
}

fn error_message(obj: &serde_json::Map<String, Value>, body: Option<&Value>) -> String {
    let from_body = match body {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(m)) => m.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    from_body
        .or_else(|| obj.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "upstream reported an error".to_string())
}

/// Incremental assembler for one streamed assistant reply.
pub struct StreamAssembler {
    buffer: Vec<u8>,
    message: ChatMessage,
    received_content: bool,
    tool_calls: Vec<ToolCallRecord>,
    sources: Vec<SourceCitation>,
    /// Terminal `done` or `error` folded in; later bytes are ignored.
    done: bool,
    /// `[DONE]` sentinel seen; remaining bytes are ignored.
    end_of_input: bool,
    tx: watch::Sender<ChatMessage>,
}

impl StreamAssembler {
    pub fn new(placeholder: impl Into<String>) -> Self {
        let message = ChatMessage::streaming_agent(placeholder);
        let (tx, _) = watch::channel(message.clone());
        Self {
            buffer: Vec::new(),
            message,
            received_content: false,
            tool_calls: Vec::new(),
            sources: Vec::new(),
            done: false,
            end_of_input: false,
            tx,
        }
    }

    /// Live view of the message being assembled.
    pub fn subscribe(&self) -> watch::Receiver<ChatMessage> {
        self.tx.subscribe()
    }

    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed the next chunk. Only complete lines are decoded; the tail waits for more bytes.
    /// Returns `Upstream` when the server sent an `error` event.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> ChatResult<()> {
        if self.done || self.end_of_input {
            return Ok(());
        }
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line)?;
            if self.done || self.end_of_input {
                self.buffer.clear();
                break;
            }
        }
        Ok(())
    }

    /// End of input. Processes a trailing line without newline, then freezes the
    /// message. A stream that closes without `done` keeps the text it accumulated.
    pub fn finish(&mut self) -> ChatResult<StreamOutcome> {
        if !self.done && !self.end_of_input && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line)?;
        }
        if !self.done {
            debug!(target: "persona::stream", "stream closed without done event");
            self.complete();
        }
        Ok(self.outcome())
    }

    /// Abort the reply: the text becomes the canned failure message and the stream is frozen.
    pub fn fail(&mut self, err: &ChatError) {
        warn!(target: "persona::stream", "stream failed: {}", err);
        self.message.text = FAILURE_MESSAGE.to_string();
        self.tool_calls.clear();
        self.sources.clear();
        self.message.tool_calls = None;
        self.message.sources = None;
        self.complete();
    }

    fn process_line(&mut self, raw: &[u8]) -> ChatResult<()> {
        let line = String::from_utf8_lossy(raw);
        if data_payload(&line) == Some(DONE_SENTINEL) {
            debug!(target: "persona::stream", "end-of-input sentinel");
            self.end_of_input = true;
            return Ok(());
        }
        match parse_frame_line(&line) {
            Some(event) => self.apply(event),
            None => Ok(()),
        }
    }

    fn apply(&mut self, event: StreamEvent) -> ChatResult<()> {
        match event {
            StreamEvent::Content(text) => {
                if self.received_content {
                    self.message.text.push_str(&text);
                } else {
                    self.message.text = text;
                    self.received_content = true;
                }
                self.publish();
            }
            StreamEvent::Sources(sources) => {
                self.sources = sources;
            }
            StreamEvent::ToolCalls(calls) => {
                self.tool_calls = calls;
            }
            StreamEvent::Done(done) => {
                if !done.tool_calls_made.is_empty() {
                    self.tool_calls = done.tool_calls_made;
                }
                if !done.sources.is_empty() {
                    self.sources = done.sources;
                }
                if !self.received_content && !done.full_response.is_empty() {
                    self.message.text = done.full_response;
                    self.received_content = true;
                }
                debug!(
                    target: "persona::stream",
                    chars = self.message.text.chars().count(),
                    tool_calls = self.tool_calls.len(),
                    sources = self.sources.len(),
                    "stream done"
                );
                self.complete();
            }
            StreamEvent::Error { message } => {
                let err = ChatError::Upstream(message);
                self.fail(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn complete(&mut self) {
        self.done = true;
        self.buffer.clear();
        self.message.is_streaming = false;
        self.message.tool_calls = if self.tool_calls.is_empty() {
            None
        } else {
            Some(self.tool_calls.clone())
        };
        self.message.sources = if self.sources.is_empty() {
            None
        } else {
            Some(self.sources.clone())
        };
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(self.message.clone());
    }

    fn outcome(&self) -> StreamOutcome {
        StreamOutcome {
            text: self.message.text.clone(),
            tool_calls: self.tool_calls.clone(),
            sources: self.sources.clone(),
        }
    }
}

/// Drive `assembler` with every chunk of `stream` until it ends.
///
/// A read error replaces the reply with the failure message and returns `Transport`;
/// an upstream `error` event returns `Upstream`.
pub async fn assemble_stream<S, B, E>(
    mut stream: S,
    assembler: &mut StreamAssembler,
) -> ChatResult<StreamOutcome>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let err = ChatError::Transport(format!("Stream error: {}", e));
                assembler.fail(&err);
                return Err(err);
            }
        };
        assembler.push_bytes(chunk.as_ref())?;
        if assembler.is_done() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assembler.finish()
}
