//! Streaming completion client.
//!
//! Posts one user turn to the completion endpoint and hands back the raw response
//! body as a byte stream for the [`StreamAssembler`](crate::stream::StreamAssembler).

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use persona_core::{ChatConfig, ChatError, ChatResult, FileAttachment};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Body chunks as they arrive from the wire.
pub type ByteStream = BoxStream<'static, ChatResult<Vec<u8>>>;

/// Request body of the streaming completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub session_id: String,
    pub message: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileAttachment>>,
}

impl CompletionRequest {
    pub fn new(
        session_id: impl Into<String>,
        message: impl Into<String>,
        model: impl Into<String>,
        files: Vec<FileAttachment>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            model: model.into(),
            files: if files.is_empty() { None } else { Some(files) },
        }
    }
}

/// Anything that can open a reply stream for a request.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Open the stream. Failing to connect or a non-2xx status is `Transport`.
    async fn open(&self, request: &CompletionRequest) -> ChatResult<ByteStream>;
}

/// HTTP client for the streaming completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl CompletionClient {
    /// Streams may run for minutes, so only connecting and the gap between body
    /// chunks are bounded. There is no whole-request deadline.
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(idle_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &ChatConfig) -> ChatResult<Self> {
        Self::new(
            config.completion_url.clone(),
            config.api_key.clone(),
            config.connect_timeout(),
            config.stream_idle_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionSource for CompletionClient {
    async fn open(&self, request: &CompletionRequest) -> ChatResult<ByteStream> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Accept", "text/event-stream")
            .json(request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(target: "persona::stream", %status, "completion endpoint rejected request");
            return Err(ChatError::Transport(format!("API error {}: {}", status, body)));
        }
        debug!(target: "persona::stream", session_id = %request.session_id, "completion stream opened");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ChatError::from));
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{assemble_stream, StreamAssembler};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one chunked `text/event-stream` response, pausing `gap` before each frame.
    async fn serve_slow_stream(frames: Vec<String>, gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            for frame in frames {
                tokio::time::sleep(gap).await;
                let chunk = format!("{:x}\r\n{}\r\n", frame.len(), frame);
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/api/chat/stream", addr)
    }

    #[test]
    fn request_omits_empty_files() {
        let req = CompletionRequest::new("s1", "hello", "persona-default", Vec::new());
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["session_id"], "s1");
        assert_eq!(v["message"], "hello");
        assert!(v.get("files").is_none());
    }

    #[test]
    fn request_carries_file_metadata() {
        let file = FileAttachment {
            name: "leaf.png".to_string(),
            url: "https://files.example/leaf.png".to_string(),
            mime_type: Some("image/png".to_string()),
            size: Some(2048),
        };
        let req = CompletionRequest::new("s1", "what is this?", "m", vec![file]);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["files"][0]["name"], "leaf.png");
        assert_eq!(v["files"][0]["size"], 2048);
    }

    #[tokio::test]
    async fn stream_outlasting_idle_timeout_is_not_cut_off() {
        let frames: Vec<String> = (0..6)
            .map(|i| format!("data: {{\"type\":\"content\",\"content\":\"{}\"}}\n", i))
            .chain(std::iter::once("data: {\"type\":\"done\",\"done\":{}}\n".to_string()))
            .collect();
        // ~700ms in total, never more than 100ms between chunks.
        let url = serve_slow_stream(frames, Duration::from_millis(100)).await;
        let client = CompletionClient::new(url, None, Duration::from_secs(2), Duration::from_millis(400)).unwrap();

        let body = client
            .open(&CompletionRequest::new("s1", "slow please", "m", Vec::new()))
            .await
            .unwrap();
        let mut assembler = StreamAssembler::new("Thinking...");
        let out = assemble_stream(body, &mut assembler).await.unwrap();
        assert_eq!(out.text, "012345");
    }
}
