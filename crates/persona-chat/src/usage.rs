//! Message-sent accounting. Fired once per completed exchange; failures are logged by the caller.

use async_trait::async_trait;
use chrono::Utc;
use persona_core::{ChatError, ChatResult};
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Record one completed exchange. `conversation_id` is `None` when the conversation
    /// could not be created.
    async fn message_sent(&self, conversation_id: Option<&str>) -> ChatResult<()>;
}

/// Tracker for deployments without usage accounting.
#[derive(Debug, Default)]
pub struct NoopUsageTracker;

#[async_trait]
impl UsageTracker for NoopUsageTracker {
    async fn message_sent(&self, _conversation_id: Option<&str>) -> ChatResult<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct UsageEvent<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    timestamp: String,
}

/// Posts a `message_sent` event to the usage endpoint.
#[derive(Debug, Clone)]
pub struct HttpUsageTracker {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpUsageTracker {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl UsageTracker for HttpUsageTracker {
    async fn message_sent(&self, conversation_id: Option<&str>) -> ChatResult<()> {
        let body = UsageEvent {
            event: "message_sent",
            conversation_id,
            timestamp: Utc::now().to_rfc3339(),
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(ChatError::Transport(format!("Usage API error {}", res.status())));
        }
        Ok(())
    }
}
