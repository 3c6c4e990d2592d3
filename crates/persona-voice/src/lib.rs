//! # Persona Voice - dictation and spoken replies
//!
//! Voice input and output for the persona chat session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Voice Layer                           │
//! │  ┌──────────────┐   events   ┌──────────────────────────┐    │
//! │  │CaptureEngine │──────────▶ │ VoiceCaptureController   │    │
//! │  │ (start/stop) │◀────────── │ intent flag, ignore gate │──▶ input text
//! │  └──────────────┘  restart   └──────────────────────────┘    │
//! │                                                              │
//! │  ┌──────────────┐  miss  ┌─────────────┐  load  ┌────────┐   │
//! │  │ AudioPlayer  │──────▶ │ Synthesizer │──────▶ │  Sink  │   │
//! │  │ResourceCache │◀────── │   (HTTP)    │        │ (play) │   │
//! │  └──────────────┘  hit   └─────────────┘        └────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod capture;
pub mod error;
pub mod playback;
pub mod synthesis;

pub use cache::{cache_key, truncate_for_synthesis, AudioResource, ResourceCache, DEFAULT_CAPACITY};
pub use capture::{
    CaptureEngine, CaptureEvent, CaptureSession, CaptureState, VoiceCaptureController,
    DEFAULT_IGNORE_WINDOW,
};
pub use error::{CaptureErrorCode, VoiceError, VoiceResult};
pub use playback::{AudioClip, AudioPlayer, PlayOutcome, PlaybackSink, SilentSink};
pub use synthesis::{
    HttpSpeechSynthesizer, PlaceholderSynthesizer, SpeechSynthesizer, VoiceSettings,
};
