//! persona-core: shared types, error taxonomy, configuration, and message storage
//! for the persona chat pipeline.
//!
//! The streaming, persistence, and voice crates all speak these types, so the
//! chat session can move a reply from the wire to the store without conversions.

mod config;
mod error;
mod sled_store;
mod store;
mod types;
pub mod prompts;

pub use config::ChatConfig;
pub use error::{ChatError, ChatResult};
pub use sled_store::SledMessageStore;
pub use store::{Conversation, MemoryMessageStore, MessageStore, NewMessage, StoredMessage};
pub use types::{
    ChatMessage, DonePayload, FileAttachment, Role, SourceCitation, StreamEvent, StreamOutcome,
    ToolCallRecord, DEFAULT_PLACEHOLDER, FAILURE_MESSAGE,
};
