//! Integration test: message playback through the synthesis cache.
//!
//! Verifies that:
//! 1. Replaying the same message hits the cache and skips synthesis
//! 2. The eleventh distinct clip evicts and releases the first
//! 3. A clip that fails to play is evicted, released, and re-synthesized next time
//! 4. Synthesis failures surface as errors and leave nothing cached
//! 5. Teardown releases every resident clip exactly once

use async_trait::async_trait;
use persona_voice::{
    AudioPlayer, AudioResource, PlayOutcome, PlaybackSink, SpeechSynthesizer, VoiceError,
    VoiceResult, DEFAULT_CAPACITY,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct CountingSynth {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for CountingSynth {
    async fn synthesize(&self, text: &str, voice_id: &str) -> VoiceResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VoiceError::Synthesis("TTS API error 500: boom".to_string()));
        }
        Ok(format!("{}|{}", voice_id, text).into_bytes())
    }
}

struct Clip {
    id: String,
    released: Arc<Mutex<Vec<String>>>,
}

impl AudioResource for Clip {
    fn release(&mut self) {
        self.released.lock().unwrap().push(self.id.clone());
    }
}

/// Sink that records plays and fails any clip whose text contains "broken".
#[derive(Clone, Default)]
struct RecordingSink {
    played: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<String>>>,
    broken_plays: Arc<AtomicUsize>,
}

impl PlaybackSink for RecordingSink {
    type Handle = Clip;

    fn load(&self, bytes: Vec<u8>) -> VoiceResult<Clip> {
        Ok(Clip {
            id: String::from_utf8_lossy(&bytes).into_owned(),
            released: Arc::clone(&self.released),
        })
    }

    fn play(&self, handle: &Clip) -> VoiceResult<()> {
        if handle.id.contains("broken") {
            self.broken_plays.fetch_add(1, Ordering::SeqCst);
            return Err(VoiceError::Playback("decoder rejected clip".to_string()));
        }
        self.played.lock().unwrap().push(handle.id.clone());
        Ok(())
    }

    fn stop(&self) {}
}

fn player(synth: CountingSynth, sink: RecordingSink) -> AudioPlayer<CountingSynth, RecordingSink> {
    AudioPlayer::new(synth, sink, DEFAULT_CAPACITY)
}

#[tokio::test]
async fn replay_hits_cache() {
    let synth = CountingSynth::default();
    let sink = RecordingSink::default();
    let mut p = player(synth.clone(), sink.clone());

    assert_eq!(p.play("Hello there.", "v1").await.unwrap(), PlayOutcome::Synthesized);
    assert_eq!(p.play("Hello there.", "v1").await.unwrap(), PlayOutcome::CacheHit);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.played.lock().unwrap().len(), 2);

    // Different voice is a different key.
    assert_eq!(p.play("Hello there.", "v2").await.unwrap(), PlayOutcome::Synthesized);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn eleventh_clip_evicts_first() {
    let synth = CountingSynth::default();
    let sink = RecordingSink::default();
    let mut p = player(synth.clone(), sink.clone());

    for i in 0..11 {
        p.play(&format!("message {}", i), "v1").await.unwrap();
    }
    assert_eq!(p.cache().len(), DEFAULT_CAPACITY);
    assert_eq!(*sink.released.lock().unwrap(), vec!["v1|message 0".to_string()]);

    // Evicted clip must be synthesized again.
    assert_eq!(p.play("message 0", "v1").await.unwrap(), PlayOutcome::Synthesized);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn failed_playback_evicts_and_resynthesizes() {
    let synth = CountingSynth::default();
    let sink = RecordingSink::default();
    let mut p = player(synth.clone(), sink.clone());

    assert!(p.play("broken clip", "v1").await.is_err());
    assert!(p.cache().is_empty());
    assert_eq!(*sink.released.lock().unwrap(), vec!["v1|broken clip".to_string()]);

    assert!(p.play("broken clip", "v1").await.is_err());
    assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.broken_plays.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn synthesis_error_surfaces_and_caches_nothing() {
    let synth = CountingSynth {
        fail: true,
        ..Default::default()
    };
    let sink = RecordingSink::default();
    let mut p = player(synth.clone(), sink.clone());

    let err = p.play("Hello", "v1").await.unwrap_err();
    assert!(matches!(err, VoiceError::Synthesis(_)));
    assert!(p.cache().is_empty());
    assert!(sink.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn teardown_releases_every_clip_once() {
    let synth = CountingSynth::default();
    let sink = RecordingSink::default();
    let mut p = player(synth.clone(), sink.clone());

    p.play("one", "v1").await.unwrap();
    p.play("two", "v1").await.unwrap();
    p.release_all();
    drop(p);

    let mut released = sink.released.lock().unwrap().clone();
    released.sort();
    assert_eq!(released, vec!["v1|one".to_string(), "v1|two".to_string()]);
}
