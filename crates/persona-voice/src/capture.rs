//! Continuous voice capture on top of an engine that stops on its own.
//!
//! The controller keeps one intent flag. It is set before `start()` and cleared
//! before `stop()`, so when the engine reports `End` the controller can tell a
//! user stop (intent false: go idle) from an engine stop after silence or a
//! platform limit (intent true: restart the engine).
//!
//! State machine:
//!
//! ```text
//!   Idle ──toggle──▶ (intent=true, start) ──Started──▶ Listening
//!   Listening ──toggle / message sent──▶ (intent=false, stop) ──End──▶ Idle
//!   Listening ──End (intent=true)──▶ restart ──Started──▶ Listening
//!   any ──Error(code)──▶ Idle (no restart)
//! ```

use crate::error::{CaptureErrorCode, VoiceError, VoiceResult};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long results are discarded after a message is sent.
pub const DEFAULT_IGNORE_WINDOW: Duration = Duration::from_millis(500);

/// A continuous-recognition primitive. Acknowledgements and results arrive later
/// as [`CaptureEvent`]s fed to [`VoiceCaptureController::handle_event`].
pub trait CaptureEngine: Send {
    fn start(&mut self) -> VoiceResult<()>;

    fn stop(&mut self) -> VoiceResult<()>;
}

/// Callbacks from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The engine confirmed it is capturing.
    Started,
    /// New recognition output: segments finalized since the last callback, plus the
    /// current interim guess (which replaces the previous one).
    Result {
        finalized: Vec<String>,
        interim: String,
    },
    /// The engine session ended (after `stop()` or on its own).
    End,
    Error(CaptureErrorCode),
}

/// Externally visible capture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
}

/// Snapshot of the controller flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSession {
    pub listening: bool,
    pub ignore_results: bool,
}

pub struct VoiceCaptureController<E: CaptureEngine> {
    engine: E,
    /// What the user wants. Drives the auto-restart decision.
    intent: bool,
    /// What the engine has confirmed.
    listening: bool,
    ignore_until: Option<Instant>,
    ignore_window: Duration,
    /// Typed text present when dictation started; dictated text is appended to it.
    base_text: String,
    finalized: String,
    interim: String,
    last_error: Option<CaptureErrorCode>,
    input_tx: watch::Sender<String>,
}

impl<E: CaptureEngine> VoiceCaptureController<E> {
    pub fn new(engine: E) -> Self {
        Self::with_ignore_window(engine, DEFAULT_IGNORE_WINDOW)
    }

    pub fn with_ignore_window(engine: E, ignore_window: Duration) -> Self {
        let (input_tx, _) = watch::channel(String::new());
        Self {
            engine,
            intent: false,
            listening: false,
            ignore_until: None,
            ignore_window,
            base_text: String::new(),
            finalized: String::new(),
            interim: String::new(),
            last_error: None,
            input_tx,
        }
    }

    /// Receiver of the input-box content produced by dictation.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.input_tx.subscribe()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn state(&self) -> CaptureState {
        if self.listening {
            CaptureState::Listening
        } else {
            CaptureState::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn intent(&self) -> bool {
        self.intent
    }

    /// True when reported state and intent agree (no acknowledgement pending).
    pub fn is_settled(&self) -> bool {
        self.listening == self.intent
    }

    pub fn ignore_results(&self) -> bool {
        self.ignore_until.is_some_and(|t| Instant::now() < t)
    }

    pub fn session(&self) -> CaptureSession {
        CaptureSession {
            listening: self.listening,
            ignore_results: self.ignore_results(),
        }
    }

    pub fn last_error(&self) -> Option<CaptureErrorCode> {
        self.last_error
    }

    /// Current input content (base text + finalized + interim).
    pub fn current_text(&self) -> String {
        self.input_tx.borrow().clone()
    }

    /// Text the user typed before dictating; dictated speech is appended after it.
    pub fn set_base_text(&mut self, text: impl Into<String>) {
        self.base_text = text.into();
    }

    /// Start when idle, stop when listening (or starting).
    pub fn toggle(&mut self) -> VoiceResult<CaptureState> {
        if self.intent || self.listening {
            self.stop_capture();
        } else {
            self.start_capture()?;
        }
        Ok(self.state())
    }

    fn start_capture(&mut self) -> VoiceResult<()> {
        self.intent = true;
        self.last_error = None;
        self.finalized.clear();
        self.interim.clear();
        if let Err(e) = self.engine.start() {
            warn!(target: "persona::voice", "capture engine failed to start: {}", e);
            self.intent = false;
            return Err(e);
        }
        debug!(target: "persona::voice", "capture start requested");
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.intent = false;
        if let Err(e) = self.engine.stop() {
            warn!(target: "persona::voice", "capture engine stop failed: {}", e);
            self.listening = false;
        }
        debug!(target: "persona::voice", "capture stop requested");
    }

    /// Gate applied right after a message is sent: stop capture, drop in-flight
    /// results for the ignore window, and clear the dictated transcript.
    pub fn on_message_sent(&mut self) {
        if self.intent || self.listening {
            self.ignore_until = Some(Instant::now() + self.ignore_window);
            self.stop_capture();
            info!(target: "persona::voice", "message sent while capturing; ignoring results for {:?}", self.ignore_window);
        }
        self.base_text.clear();
        self.finalized.clear();
        self.interim.clear();
        self.input_tx.send_replace(String::new());
    }

    /// Fold one engine callback into the controller. Returns the published input
    /// text when a result was accepted.
    pub fn handle_event(&mut self, event: CaptureEvent) -> Option<String> {
        match event {
            CaptureEvent::Started => {
                if self.intent {
                    self.listening = true;
                    info!(target: "persona::voice", "capture listening");
                } else {
                    debug!(target: "persona::voice", "start acknowledged after stop was requested");
                }
                None
            }
            CaptureEvent::Result { finalized, interim } => {
                if self.ignore_results() {
                    debug!(target: "persona::voice", "discarding capture result inside ignore window");
                    return None;
                }
                for segment in finalized {
                    self.finalized.push_str(&segment);
                }
                self.interim = interim;
                let text = format!("{}{}{}", self.base_text, self.finalized, self.interim);
                self.input_tx.send_replace(text.clone());
                Some(text)
            }
            CaptureEvent::End => {
                self.listening = false;
                self.interim.clear();
                if self.intent {
                    info!(target: "persona::voice", "capture engine ended on its own; restarting");
                    if let Err(e) = self.engine.start() {
                        warn!(target: "persona::voice", "capture restart failed: {}", e);
                        self.intent = false;
                    }
                } else {
                    debug!(target: "persona::voice", "capture idle");
                }
                None
            }
            CaptureEvent::Error(code) => {
                warn!(target: "persona::voice", %code, "capture error");
                self.intent = false;
                self.listening = false;
                self.last_error = Some(code);
                None
            }
        }
    }

    /// Message for the last engine error, if any.
    pub fn error_message(&self) -> Option<&'static str> {
        self.last_error.map(|c| c.user_message())
    }

    /// Stop any active capture (session teardown).
    pub fn shutdown(&mut self) {
        if self.intent || self.listening {
            self.stop_capture();
        }
        self.listening = false;
    }

    /// Convenience for callers that want a hard error for the last capture failure.
    pub fn check_error(&self) -> VoiceResult<()> {
        match self.last_error {
            Some(code) => Err(VoiceError::Capture(code)),
            None => Ok(()),
        }
    }
}
