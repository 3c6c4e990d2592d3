//! Message store contract and an in-memory implementation.
//!
//! The store owns conversations and their ordered messages. It may timestamp by
//! arrival, so callers that need ordering must await one write before issuing the next.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{ChatError, ChatResult};
use crate::types::{FileAttachment, Role, SourceCitation, ToolCallRecord};

/// A message to be appended. Citations and tool calls are only ever set on agent messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default)]
    pub citations: Vec<SourceCitation>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>, files: Vec<FileAttachment>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            files,
            citations: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn agent(
        text: impl Into<String>,
        citations: Vec<SourceCitation>,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
            files: Vec::new(),
            citations,
            tool_calls,
        }
    }
}

/// A message as persisted, with the store-assigned id and arrival timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default)]
    pub citations: Vec<SourceCitation>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn from_new(conversation_id: &str, msg: NewMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: msg.role,
            text: msg.text,
            files: msg.files,
            citations: msg.citations,
            tool_calls: msg.tool_calls,
            created_at: Utc::now(),
        }
    }
}

/// Conversation header. Messages are fetched separately via [`MessageStore::messages`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable conversation storage used by the persistence sequencer.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a conversation. When `first_message` is given it is stored in the same call.
    async fn create_conversation(
        &self,
        title: &str,
        first_message: Option<NewMessage>,
    ) -> ChatResult<String>;

    /// Append a message and return it once it is durable.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> ChatResult<StoredMessage>;

    async fn update_title(&self, conversation_id: &str, title: &str) -> ChatResult<()>;

    async fn conversation(&self, conversation_id: &str) -> ChatResult<Option<Conversation>>;

    /// Messages of a conversation in store order.
    async fn messages(&self, conversation_id: &str) -> ChatResult<Vec<StoredMessage>>;
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

/// Process-local store, for tests and offline sessions.
#[derive(Default)]
pub struct MemoryMessageStore {
    state: Mutex<MemoryState>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_conversation(
        &self,
        title: &str,
        first_message: Option<NewMessage>,
    ) -> ChatResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.conversations.insert(
            id.clone(),
            Conversation {
                id: id.clone(),
                title: title.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        let initial = first_message
            .map(|m| vec![StoredMessage::from_new(&id, m)])
            .unwrap_or_default();
        state.messages.insert(id.clone(), initial);
        Ok(id)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> ChatResult<StoredMessage> {
        let mut state = self.state.lock().await;
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::Persistence(format!("unknown conversation {}", conversation_id)))?;
        conv.updated_at = Utc::now();
        let stored = StoredMessage::from_new(conversation_id, message);
        state
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_title(&self, conversation_id: &str, title: &str) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::Persistence(format!("unknown conversation {}", conversation_id)))?;
        conv.title = title.to_string();
        conv.updated_at = Utc::now();
        Ok(())
    }

    async fn conversation(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        Ok(self.state.lock().await.conversations.get(conversation_id).cloned())
    }

    async fn messages(&self, conversation_id: &str) -> ChatResult<Vec<StoredMessage>> {
        Ok(self
            .state
            .lock()
            .await
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
