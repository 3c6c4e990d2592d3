//! Persistence Sequencer: write one completed exchange to the message store.
//!
//! Order is fixed: the user message is durable before the assistant message is
//! written, with a minimum gap between them for stores that timestamp by arrival.
//! Title generation runs in the background and never fails the exchange.
//!
//! ```text
//!   Sent ─▶ Streaming ─▶ Completed ─▶ Persisting ─┬─▶ Done
//!                                                 └─▶ PersistFailed
//! ```

use persona_core::{
    ChatError, FileAttachment, MessageStore, NewMessage, StreamOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::title::{fallback_title, TitleGenerator};
use crate::usage::UsageTracker;

/// Default gap between the durable user append and the assistant append.
pub const DEFAULT_ASSISTANT_APPEND_DELAY: Duration = Duration::from_millis(100);

/// Where the current exchange is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Sent,
    Streaming,
    Completed,
    Persisting,
    Done,
    PersistFailed,
}

/// Everything needed to persist one exchange. Files travel here, not through shared state.
#[derive(Debug, Clone, Default)]
pub struct ExchangeInput {
    /// `None` for the first exchange of a new conversation.
    pub conversation_id: Option<String>,
    pub user_text: String,
    pub files: Vec<FileAttachment>,
    pub outcome: StreamOutcome,
}

/// Result of [`PersistenceSequencer::persist`].
#[derive(Debug)]
pub struct PersistReport {
    pub conversation_id: Option<String>,
    pub phase: ExchangePhase,
    /// Background title task; resolves to the title that was written (or attempted).
    pub title_task: Option<JoinHandle<String>>,
    pub error: Option<ChatError>,
}

impl PersistReport {
    pub fn is_success(&self) -> bool {
        self.phase == ExchangePhase::Done
    }
}

pub struct PersistenceSequencer {
    store: Arc<dyn MessageStore>,
    titles: Arc<dyn TitleGenerator>,
    usage: Arc<dyn UsageTracker>,
    assistant_delay: Duration,
    phase: watch::Sender<ExchangePhase>,
}

impl PersistenceSequencer {
    pub fn new(
        store: Arc<dyn MessageStore>,
        titles: Arc<dyn TitleGenerator>,
        usage: Arc<dyn UsageTracker>,
    ) -> Self {
        let (phase, _) = watch::channel(ExchangePhase::Done);
        Self {
            store,
            titles,
            usage,
            assistant_delay: DEFAULT_ASSISTANT_APPEND_DELAY,
            phase,
        }
    }

    pub fn with_assistant_delay(mut self, delay: Duration) -> Self {
        self.assistant_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn phase(&self) -> ExchangePhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ExchangePhase> {
        self.phase.subscribe()
    }

    /// Record a phase reached outside the sequencer (send, streaming, stream completion).
    pub fn mark(&self, phase: ExchangePhase) {
        debug!(target: "persona::sequencer", ?phase, "phase");
        self.phase.send_replace(phase);
    }

    /// Persist a completed exchange. Failures are reported in the returned report and
    /// never rolled back; records already written stay.
    pub async fn persist(&self, input: ExchangeInput) -> PersistReport {
        self.mark(ExchangePhase::Persisting);
        let first_exchange = input.conversation_id.is_none();
        let wants_title = first_exchange || !input.outcome.tool_calls.is_empty();

        let result = self.write_messages(&input).await;
        let (conversation_id, phase, error) = match result {
            Ok(id) => (Some(id), ExchangePhase::Done, None),
            Err((id, e)) => {
                error!(target: "persona::sequencer", "failed to persist exchange: {}", e);
                (id, ExchangePhase::PersistFailed, Some(e))
            }
        };

        if let Err(e) = self.usage.message_sent(conversation_id.as_deref()).await {
            warn!(target: "persona::sequencer", "usage tracking failed: {}", e);
        }

        let title_task = match (&conversation_id, phase) {
            (Some(id), ExchangePhase::Done) if wants_title => Some(self.spawn_title(
                id.clone(),
                input.user_text.clone(),
                input.outcome.text.clone(),
            )),
            _ => None,
        };

        self.mark(phase);
        PersistReport {
            conversation_id,
            phase,
            title_task,
            error,
        }
    }

    /// Writes user then assistant. On failure returns the conversation id if one exists.
    async fn write_messages(
        &self,
        input: &ExchangeInput,
    ) -> Result<String, (Option<String>, ChatError)> {
        let user = NewMessage::user(input.user_text.clone(), input.files.clone());

        let conversation_id = match &input.conversation_id {
            None => {
                let title = fallback_title(&input.user_text);
                let id = self
                    .store
                    .create_conversation(&title, Some(user))
                    .await
                    .map_err(|e| (None, persistence(e)))?;
                info!(target: "persona::sequencer", conversation_id = %id, "conversation created");
                id
            }
            Some(id) => {
                self.store
                    .append_message(id, user)
                    .await
                    .map_err(|e| (Some(id.clone()), persistence(e)))?;
                id.clone()
            }
        };

        tokio::time::sleep(self.assistant_delay).await;

        let agent = NewMessage::agent(
            input.outcome.text.clone(),
            input.outcome.sources.clone(),
            input.outcome.tool_calls.clone(),
        );
        self.store
            .append_message(&conversation_id, agent)
            .await
            .map_err(|e| (Some(conversation_id.clone()), persistence(e)))?;
        debug!(target: "persona::sequencer", conversation_id = %conversation_id, "exchange persisted");
        Ok(conversation_id)
    }

    fn spawn_title(
        &self,
        conversation_id: String,
        user_text: String,
        agent_text: String,
    ) -> JoinHandle<String> {
        let store = Arc::clone(&self.store);
        let titles = Arc::clone(&self.titles);
        tokio::spawn(async move {
            let title = match titles.generate(&user_text, &agent_text).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(target: "persona::sequencer", "title generation failed, using fallback: {}", e);
                    fallback_title(&user_text)
                }
            };
            match store.update_title(&conversation_id, &title).await {
                Ok(()) => info!(target: "persona::sequencer", %conversation_id, %title, "conversation titled"),
                Err(e) => warn!(target: "persona::sequencer", %conversation_id, "failed to store title: {}", e),
            }
            title
        })
    }
}

fn persistence(err: ChatError) -> ChatError {
    match err {
        ChatError::Persistence(_) => err,
        other => ChatError::Persistence(other.to_string()),
    }
}
