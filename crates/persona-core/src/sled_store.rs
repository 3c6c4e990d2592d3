//! Durable message store: Sled DB with a DashMap hot cache for conversation headers.
//!
//! Layout:
//! - `conv/{conversation_id}` -> JSON [`Conversation`]
//! - `msg/{conversation_id}/{seq:020}` -> JSON [`StoredMessage`], `seq` from `Db::generate_id`
//!
//! Message keys sort by arrival, so a prefix scan returns store order. A new
//! conversation and its first message land in one `sled::Batch`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::store::{Conversation, MessageStore, NewMessage, StoredMessage};

const DEFAULT_STORE_DIR: &str = "persona_messages";

fn conversation_key(id: &str) -> String {
    format!("conv/{}", id)
}

fn message_prefix(conversation_id: &str) -> String {
    format!("msg/{}/", conversation_id)
}

/// Sled-backed [`MessageStore`].
pub struct SledMessageStore {
    db: Db,
    /// Hot cache: conversation id -> header. Checked before Sled.
    conversations: Arc<DashMap<String, Conversation>>,
}

impl SledMessageStore {
    /// Opens or creates the store under `{storage_path}/persona_messages`.
    pub fn open_in<P: AsRef<Path>>(storage_path: P) -> ChatResult<Self> {
        Self::open_path(storage_path.as_ref().join(DEFAULT_STORE_DIR))
    }

    /// Opens or creates a Sled database at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            conversations: Arc::new(DashMap::new()),
        })
    }

    fn load_conversation(&self, id: &str) -> ChatResult<Option<Conversation>> {
        if let Some(c) = self.conversations.get(id) {
            return Ok(Some(c.clone()));
        }
        match self.conversations.entry(id.to_string()) {
            Entry::Occupied(cached) => Ok(Some(cached.get().clone())),
            Entry::Vacant(slot) => {
                let Some(raw) = self.db.get(conversation_key(id).as_bytes())? else {
                    return Ok(None);
                };
                let conv: Conversation = serde_json::from_slice(&raw)?;
                slot.insert(conv.clone());
                Ok(Some(conv))
            }
        }
    }

    /// Next key for a message in `conversation_id`, in arrival order.
    fn next_message_key(&self, conversation_id: &str) -> ChatResult<String> {
        let seq = self.db.generate_id()?;
        Ok(format!("{}{:020}", message_prefix(conversation_id), seq))
    }

    /// Read-modify-write of a header as one Sled `update_and_fetch`. The cache entry
    /// stays locked until the new header is cached, so concurrent writers to one
    /// conversation apply in order and neither loses the other's fields.
    fn update_conversation(
        &self,
        conversation_id: &str,
        change: impl Fn(&mut Conversation),
    ) -> ChatResult<Conversation> {
        let entry = self.conversations.entry(conversation_id.to_string());
        let mut codec_error = None;
        let updated = self
            .db
            .update_and_fetch(conversation_key(conversation_id).as_bytes(), |old| {
                let old = old?;
                let encoded = serde_json::from_slice::<Conversation>(old).and_then(|mut conv| {
                    change(&mut conv);
                    serde_json::to_vec(&conv)
                });
                match encoded {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        codec_error = Some(e);
                        Some(old.to_vec())
                    }
                }
            })?;
        if let Some(e) = codec_error {
            return Err(e.into());
        }
        let Some(raw) = updated else {
            return Err(ChatError::Persistence(format!("unknown conversation {}", conversation_id)));
        };
        let conv: Conversation = serde_json::from_slice(&raw)?;
        entry.insert(conv.clone());
        Ok(conv)
    }
}

#[async_trait]
impl MessageStore for SledMessageStore {
    async fn create_conversation(
        &self,
        title: &str,
        first_message: Option<NewMessage>,
    ) -> ChatResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let conv = Conversation {
            id: id.clone(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut batch = sled::Batch::default();
        batch.insert(conversation_key(&id).as_bytes(), serde_json::to_vec(&conv)?);
        if let Some(msg) = first_message {
            let stored = StoredMessage::from_new(&id, msg);
            batch.insert(self.next_message_key(&id)?.as_bytes(), serde_json::to_vec(&stored)?);
        }
        self.db.apply_batch(batch)?;
        self.conversations.insert(id.clone(), conv);
        self.db.flush_async().await?;
        debug!(target: "persona::store", conversation_id = %id, "conversation created");
        Ok(id)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> ChatResult<StoredMessage> {
        let now = Utc::now();
        self.update_conversation(conversation_id, |conv| conv.updated_at = now)?;
        let stored = StoredMessage::from_new(conversation_id, message);
        self.db
            .insert(self.next_message_key(conversation_id)?.as_bytes(), serde_json::to_vec(&stored)?)?;
        self.db.flush_async().await?;
        debug!(
            target: "persona::store",
            conversation_id,
            role = stored.role.as_str(),
            "message appended"
        );
        Ok(stored)
    }

    async fn update_title(&self, conversation_id: &str, title: &str) -> ChatResult<()> {
        let now = Utc::now();
        self.update_conversation(conversation_id, |conv| {
            conv.title = title.to_string();
            conv.updated_at = now;
        })?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn conversation(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        self.load_conversation(conversation_id)
    }

    async fn messages(&self, conversation_id: &str) -> ChatResult<Vec<StoredMessage>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(message_prefix(conversation_id).as_bytes()) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}
