//! # Persona Chat - the real-time message pipeline
//!
//! Streams an assistant reply into a live message, persists the exchange in
//! order, and titles new conversations in the background.
//!
//! ```text
//!   submit ─▶ CompletionSource ─▶ StreamAssembler ─▶ PersistenceSequencer ─▶ MessageStore
//!                                      │ watch                 └─ spawn ─▶ TitleGenerator
//!                                      ▼
//!                                 live reply
//! ```

pub mod completion;
pub mod sequencer;
pub mod session;
pub mod stream;
pub mod title;
pub mod usage;

pub use completion::{ByteStream, CompletionClient, CompletionRequest, CompletionSource};
pub use sequencer::{
    ExchangeInput, ExchangePhase, PersistReport, PersistenceSequencer,
    DEFAULT_ASSISTANT_APPEND_DELAY,
};
pub use session::{ChatSession, ExchangeResult};
pub use stream::{assemble_stream, parse_frame_line, StreamAssembler};
pub use title::{
    clean_title, fallback_title, HttpTitleGenerator, PromptedTitleGenerator, TitleGenerator,
};
pub use usage::{HttpUsageTracker, NoopUsageTracker, UsageTracker};
