//! Chat session: one chat screen's worth of state and control flow.
//!
//! Owns the per-session singletons (capture controller, audio player, sequencer)
//! and allows a single exchange in flight at a time.

use persona_core::{ChatConfig, ChatError, ChatMessage, ChatResult, FileAttachment};
use persona_voice::{
    AudioPlayer, CaptureEngine, CaptureEvent, CaptureState, PlayOutcome, PlaybackSink,
    SpeechSynthesizer, VoiceCaptureController,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::completion::{CompletionRequest, CompletionSource};
use crate::sequencer::{ExchangeInput, ExchangePhase, PersistReport, PersistenceSequencer};
use crate::stream::{assemble_stream, StreamAssembler};

/// A finished exchange: the frozen reply plus what persistence did with it.
#[derive(Debug)]
pub struct ExchangeResult {
    pub reply: ChatMessage,
    pub report: PersistReport,
}

/// Clears the in-flight flag when the exchange ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatSession<E, S, P>
where
    E: CaptureEngine,
    S: SpeechSynthesizer,
    P: PlaybackSink,
{
    session_id: String,
    config: ChatConfig,
    completion: Arc<dyn CompletionSource>,
    sequencer: PersistenceSequencer,
    capture: Mutex<VoiceCaptureController<E>>,
    player: Mutex<AudioPlayer<S, P>>,
    conversation_id: Mutex<Option<String>>,
    transcript: Mutex<Vec<ChatMessage>>,
    reply_tx: Arc<watch::Sender<Option<ChatMessage>>>,
    in_flight: AtomicBool,
}

impl<E, S, P> ChatSession<E, S, P>
where
    E: CaptureEngine,
    S: SpeechSynthesizer,
    P: PlaybackSink,
{
    pub fn new(
        config: ChatConfig,
        completion: Arc<dyn CompletionSource>,
        sequencer: PersistenceSequencer,
        capture_engine: E,
        synthesizer: S,
        sink: P,
    ) -> Self {
        let capture = VoiceCaptureController::with_ignore_window(capture_engine, config.ignore_window());
        let player = AudioPlayer::new(synthesizer, sink, config.audio_cache_capacity);
        let (reply_tx, _) = watch::channel(None);
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            config,
            completion,
            sequencer,
            capture: Mutex::new(capture),
            player: Mutex::new(player),
            conversation_id: Mutex::new(None),
            transcript: Mutex::new(Vec::new()),
            reply_tx: Arc::new(reply_tx),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Continue an existing conversation instead of creating one on the first exchange.
    pub async fn resume(&self, conversation_id: impl Into<String>) {
        *self.conversation_id.lock().await = Some(conversation_id.into());
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn conversation_id(&self) -> Option<String> {
        self.conversation_id.lock().await.clone()
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.lock().await.clone()
    }

    pub fn phase(&self) -> ExchangePhase {
        self.sequencer.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The reply being streamed, updated token by token.
    pub fn subscribe_reply(&self) -> watch::Receiver<Option<ChatMessage>> {
        self.reply_tx.subscribe()
    }

    /// Send one user message and stream the reply.
    ///
    /// Returns `Busy` while another exchange is in flight. A transport or upstream
    /// failure leaves the failure message as the reply in the transcript and is returned
    /// as the error; nothing is persisted for it.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        files: Vec<FileAttachment>,
    ) -> ChatResult<ExchangeResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(target: "persona::sequencer", "submit rejected: exchange already in flight");
            return Err(ChatError::Busy);
        }
        let _guard = InFlight(&self.in_flight);
        let text = text.into();

        self.capture.lock().await.on_message_sent();
        self.transcript
            .lock()
            .await
            .push(ChatMessage::user(text.clone(), files.clone()));
        self.sequencer.mark(ExchangePhase::Sent);

        let conversation_id = self.conversation_id.lock().await.clone();
        let request = CompletionRequest::new(
            conversation_id.clone().unwrap_or_else(|| self.session_id.clone()),
            text.clone(),
            self.config.model.clone(),
            files.clone(),
        );

        let mut assembler = StreamAssembler::new(self.config.placeholder_text.clone());
        let forward = self.forward_reply(&assembler);
        self.sequencer.mark(ExchangePhase::Streaming);

        let streamed = match self.completion.open(&request).await {
            Ok(stream) => assemble_stream(stream, &mut assembler).await,
            Err(e) => {
                assembler.fail(&e);
                Err(e)
            }
        };
        let reply = assembler.message().clone();
        drop(assembler);
        let _ = forward.await;
        self.reply_tx.send_replace(Some(reply.clone()));
        self.transcript.lock().await.push(reply.clone());

        let outcome = match streamed {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: "persona::sequencer", "exchange failed: {}", e);
                self.sequencer.mark(ExchangePhase::Completed);
                return Err(e);
            }
        };
        self.sequencer.mark(ExchangePhase::Completed);

        let report = self
            .sequencer
            .persist(ExchangeInput {
                conversation_id,
                user_text: text,
                files,
                outcome,
            })
            .await;
        if let Some(ref id) = report.conversation_id {
            *self.conversation_id.lock().await = Some(id.clone());
        }
        info!(
            target: "persona::sequencer",
            conversation_id = ?report.conversation_id,
            phase = ?report.phase,
            "exchange finished"
        );
        Ok(ExchangeResult { reply, report })
    }

    fn forward_reply(&self, assembler: &StreamAssembler) -> tokio::task::JoinHandle<()> {
        let mut rx = assembler.subscribe();
        let tx = Arc::clone(&self.reply_tx);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let msg = rx.borrow_and_update().clone();
                tx.send_replace(Some(msg));
            }
        })
    }

    /// Start or stop dictation. Typed text in `draft` is kept as a prefix.
    pub async fn toggle_capture(&self, draft: &str) -> ChatResult<CaptureState> {
        let mut capture = self.capture.lock().await;
        if capture.state() == CaptureState::Idle && !capture.intent() {
            capture.set_base_text(draft);
        }
        capture
            .toggle()
            .map_err(|e| ChatError::Capture(e.to_string()))
    }

    /// Feed an engine callback to the capture controller. Returns the updated input text.
    pub async fn capture_event(&self, event: CaptureEvent) -> Option<String> {
        self.capture.lock().await.handle_event(event)
    }

    /// Dictated input content.
    pub async fn subscribe_input(&self) -> watch::Receiver<String> {
        self.capture.lock().await.subscribe()
    }

    /// User-facing message for the last capture failure.
    pub async fn capture_error(&self) -> Option<&'static str> {
        self.capture.lock().await.error_message()
    }

    /// Speak a message with the configured voice.
    pub async fn speak(&self, text: &str) -> ChatResult<PlayOutcome> {
        self.player
            .lock()
            .await
            .play(text, &self.config.voice_id)
            .await
            .map_err(|e| ChatError::Synthesis(e.to_string()))
    }

    /// Stop capture and release cached audio. In-flight reads are not aborted.
    pub async fn teardown(&self) {
        self.capture.lock().await.shutdown();
        self.player.lock().await.release_all();
        info!(target: "persona::voice", session_id = %self.session_id, "session torn down");
    }
}
