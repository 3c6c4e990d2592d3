//! Bounded cache of synthesized audio, keyed by voice and text.
//!
//! Eviction is by insertion order: reads do not refresh an entry. Every handle that
//! leaves the cache (capacity pressure, playback failure, teardown) is released
//! exactly once on the way out.

use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Default number of resident clips.
pub const DEFAULT_CAPACITY: usize = 10;

/// Longest text (in chars) used for synthesis and key derivation.
pub const MAX_SYNTHESIS_CHARS: usize = 500;

/// A sentence break is only used as the cut point if it falls after this many chars.
const MIN_SENTENCE_CUT_CHARS: usize = 200;

/// A playable audio resource that holds something which must be given back
/// (decoded buffer, object URL, device stream).
pub trait AudioResource {
    fn release(&mut self);
}

/// Shorten long text before synthesis so repeated playback of the same message
/// hits the same cache key.
///
/// Text of at most 500 chars is returned unchanged. Longer text is cut after the
/// last `". "` that starts past char 200 (keeping the period), or hard-cut at 500
/// chars with `"..."` appended.
pub fn truncate_for_synthesis(text: &str) -> String {
    if text.chars().count() <= MAX_SYNTHESIS_CHARS {
        return text.to_string();
    }
    let prefix: String = text.chars().take(MAX_SYNTHESIS_CHARS).collect();
    if let Some(idx) = prefix.rfind(". ") {
        if prefix[..idx].chars().count() > MIN_SENTENCE_CUT_CHARS {
            return prefix[..=idx].to_string();
        }
    }
    format!("{}...", prefix)
}

/// Cache key for a synthesis request. `text` should already be truncated.
pub fn cache_key(voice_id: &str, text: &str) -> String {
    format!("{}:{}", voice_id, text)
}

/// Fixed-capacity, insertion-ordered map from synthesis key to audio handle.
pub struct ResourceCache<H: AudioResource> {
    capacity: usize,
    entries: HashMap<String, H>,
    /// Keys oldest-first.
    order: VecDeque<String>,
}

impl<H: AudioResource> ResourceCache<H> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&H> {
        self.entries.get(key)
    }

    /// Insert a handle. On a full cache the oldest entry is released first.
    /// Re-inserting a key releases the previous handle and makes the key newest.
    pub fn put(&mut self, key: impl Into<String>, handle: H) {
        let key = key.into();
        if self.entries.contains_key(&key) {
            self.evict_and_release(&key);
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(mut evicted) = self.entries.remove(&oldest) {
                debug!(target: "persona::cache", key = %oldest, "evicting oldest clip");
                evicted.release();
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, handle);
    }

    /// Remove `key` and release its handle. Returns false when the key was not resident.
    pub fn evict_and_release(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(mut handle) => {
                self.order.retain(|k| k != key);
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Release every resident handle.
    pub fn clear(&mut self) {
        self.order.clear();
        for (_, mut handle) in self.entries.drain() {
            handle.release();
        }
    }
}

impl<H: AudioResource> Drop for ResourceCache<H> {
    fn drop(&mut self) {
        self.clear();
    }
}
