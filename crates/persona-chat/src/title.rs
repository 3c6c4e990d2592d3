//! Conversation titles.
//!
//! A new conversation is created with [`fallback_title`] (the truncated first
//! message) and renamed once a generator returns something better.

use async_trait::async_trait;
use persona_core::prompts::{title_user_prompt, TITLE_SYSTEM};
use persona_core::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FALLBACK_TITLE_CHARS: usize = 50;
const MAX_TITLE_CHARS: usize = 80;

/// Provisional title: the message as typed, cut to 50 chars with `"..."` when longer.
pub fn fallback_title(user_message: &str) -> String {
    if user_message.chars().count() > FALLBACK_TITLE_CHARS {
        let head: String = user_message.chars().take(FALLBACK_TITLE_CHARS).collect();
        format!("{}...", head)
    } else {
        user_message.to_string()
    }
}

/// Strip quotes and trailing punctuation a model tends to add; empty means "no title".
pub fn clean_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let t = line
        .trim()
        .trim_start_matches("Title:")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim_end_matches(&['.', '!', '?', ':'][..])
        .trim();
    t.chars().take(MAX_TITLE_CHARS).collect()
}

#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, user_message: &str, agent_response: &str) -> ChatResult<String>;
}

#[derive(Serialize)]
struct TitleRequest<'a> {
    user_message: &'a str,
    agent_response: &'a str,
}

#[derive(Deserialize)]
struct TitleResponse {
    #[serde(default)]
    title: String,
}

/// Title generation through the product's title endpoint.
#[derive(Debug, Clone)]
pub struct HttpTitleGenerator {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTitleGenerator {
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
impl TitleGenerator for HttpTitleGenerator {
    async fn generate(&self, user_message: &str, agent_response: &str) -> ChatResult<String> {
        let body = TitleRequest {
            user_message,
            agent_response,
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.map_err(|e| ChatError::Title(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChatError::Title(format!("Title API error {}: {}", status, body)));
        }
        let parsed: TitleResponse = res.json().await.map_err(|e| ChatError::Title(e.to_string()))?;
        let title = clean_title(&parsed.title);
        if title.is_empty() {
            return Err(ChatError::Title("empty title".to_string()));
        }
        Ok(title)
    }
}

// OpenAI-compatible chat completion, non-streaming.
#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct PromptMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<PromptChoice>,
}

#[derive(Deserialize)]
struct PromptChoice {
    message: PromptChoiceMessage,
}

#[derive(Deserialize)]
struct PromptChoiceMessage {
    content: String,
}

/// Builds the title prompt locally and asks an OpenAI-compatible chat endpoint for it.
#[derive(Debug, Clone)]
pub struct PromptedTitleGenerator {
    url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl PromptedTitleGenerator {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl TitleGenerator for PromptedTitleGenerator {
    async fn generate(&self, user_message: &str, agent_response: &str) -> ChatResult<String> {
        let prompt = title_user_prompt(user_message, agent_response);
        let body = PromptRequest {
            model: &self.model,
            messages: vec![
                PromptMessage {
                    role: "system",
                    content: TITLE_SYSTEM,
                },
                PromptMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 24,
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.map_err(|e| ChatError::Title(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChatError::Title(format!("Title API error {}: {}", status, body)));
        }
        let parsed: PromptResponse = res.json().await.map_err(|e| ChatError::Title(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let title = clean_title(&content);
        if title.is_empty() {
            return Err(ChatError::Title("empty title".to_string()));
        }
        Ok(title)
    }
}
