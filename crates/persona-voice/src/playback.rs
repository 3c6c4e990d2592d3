//! **AudioPlayer** — message playback through the synthesis cache.
//!
//! Looks up `(voice, truncated text)` in the [`ResourceCache`]; on a miss it
//! synthesizes, loads the bytes into a sink handle, caches it, and plays. A clip
//! that fails to play is evicted and released immediately; nothing is retried.

use crate::cache::{cache_key, truncate_for_synthesis, AudioResource, ResourceCache};
use crate::error::{VoiceError, VoiceResult};
use crate::synthesis::SpeechSynthesizer;
use tracing::{info, warn};

/// Output device abstraction. `load` decodes bytes into a releasable handle; `play` starts it.
pub trait PlaybackSink: Send + Sync {
    type Handle: AudioResource + Send;

    fn load(&self, bytes: Vec<u8>) -> VoiceResult<Self::Handle>;

    fn play(&self, handle: &Self::Handle) -> VoiceResult<()>;

    /// Stop whatever is playing.
    fn stop(&self);
}

/// Encoded clip held in memory.
#[derive(Debug, Default)]
pub struct AudioClip {
    bytes: Vec<u8>,
    released: bool,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, released: false }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl AudioResource for AudioClip {
    fn release(&mut self) {
        self.bytes = Vec::new();
        self.released = true;
    }
}

/// Sink that accepts clips but produces no sound (headless sessions, CLI).
#[derive(Debug, Default)]
pub struct SilentSink;

impl PlaybackSink for SilentSink {
    type Handle = AudioClip;

    fn load(&self, bytes: Vec<u8>) -> VoiceResult<AudioClip> {
        Ok(AudioClip::new(bytes))
    }

    fn play(&self, handle: &AudioClip) -> VoiceResult<()> {
        if handle.is_released() {
            return Err(VoiceError::Playback("clip already released".to_string()));
        }
        Ok(())
    }

    fn stop(&self) {}
}

/// What `AudioPlayer::play` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Played a clip already in the cache.
    CacheHit,
    /// Synthesized, cached, and played a new clip.
    Synthesized,
    /// Backend returned no audio; nothing played or cached.
    Skipped,
}

/// Per-session playback coordinator.
pub struct AudioPlayer<S: SpeechSynthesizer, P: PlaybackSink> {
    synthesizer: S,
    sink: P,
    cache: ResourceCache<P::Handle>,
}

impl<S: SpeechSynthesizer, P: PlaybackSink> AudioPlayer<S, P> {
    pub fn new(synthesizer: S, sink: P, capacity: usize) -> Self {
        Self {
            synthesizer,
            sink,
            cache: ResourceCache::new(capacity),
        }
    }

    pub fn cache(&self) -> &ResourceCache<P::Handle> {
        &self.cache
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    /// Speak `text` with `voice_id`, reusing a cached clip when possible.
    pub async fn play(&mut self, text: &str, voice_id: &str) -> VoiceResult<PlayOutcome> {
        let text = truncate_for_synthesis(text);
        let key = cache_key(voice_id, &text);

        if let Some(handle) = self.cache.get(&key) {
            return match self.sink.play(handle) {
                Ok(()) => Ok(PlayOutcome::CacheHit),
                Err(e) => {
                    warn!(target: "persona::voice", "cached clip failed to play, evicting: {}", e);
                    self.cache.evict_and_release(&key);
                    Err(e)
                }
            };
        }

        let bytes = match self.synthesizer.synthesize(&text, voice_id).await {
            Ok(b) => b,
            Err(e) => {
                warn!(target: "persona::voice", "synthesis failed: {}", e);
                self.cache.evict_and_release(&key);
                return Err(e);
            }
        };
        if bytes.is_empty() {
            return Ok(PlayOutcome::Skipped);
        }

        let handle = self.sink.load(bytes)?;
        self.cache.put(key.clone(), handle);
        let played = match self.cache.get(&key) {
            Some(handle) => self.sink.play(handle),
            None => Err(VoiceError::Playback("clip missing after insert".to_string())),
        };
        match played {
            Ok(()) => Ok(PlayOutcome::Synthesized),
            Err(e) => {
                warn!(target: "persona::voice", "new clip failed to play, evicting: {}", e);
                self.cache.evict_and_release(&key);
                Err(e)
            }
        }
    }

    /// Stop playback and release every cached clip (session teardown).
    pub fn release_all(&mut self) {
        self.sink.stop();
        let n = self.cache.len();
        self.cache.clear();
        info!(target: "persona::voice", released = n, "audio cache released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::PlaceholderSynthesizer;

    #[tokio::test]
    async fn empty_synthesis_is_skipped_and_not_cached() {
        let mut player = AudioPlayer::new(PlaceholderSynthesizer, SilentSink, 4);
        let out = player.play("hello", "v1").await.unwrap();
        assert_eq!(out, PlayOutcome::Skipped);
        assert!(player.cache().is_empty());
    }

    #[test]
    fn released_clip_drops_bytes() {
        let mut clip = AudioClip::new(vec![1, 2, 3]);
        clip.release();
        assert!(clip.is_released());
        assert!(clip.is_empty());
        assert!(SilentSink.play(&clip).is_err());
    }
}
