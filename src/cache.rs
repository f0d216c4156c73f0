use crate::engine::{AudioHandle, ClipId};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 30;

/// Insertion-ordered, capacity-bounded map from narration text to audio.
///
/// Eviction drops the oldest entry that is not the clip currently playing.
/// Dropping the cache's reference is what releases the buffer; see
/// [`AudioHandle`].
pub struct SpeechCache {
    entries: HashMap<String, AudioHandle>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    capacity: usize,
    playing: Option<ClipId>,
}

impl SpeechCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            playing: None,
        }
    }

    pub fn get(&self, text: &str) -> Option<AudioHandle> {
        self.entries.get(text).cloned()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    /// Insert `handle` for `text`, then evict down to capacity.
    ///
    /// Re-inserting an existing text swaps the handle but keeps its position.
    pub fn put(&mut self, text: &str, handle: AudioHandle) {
        if let Some(slot) = self.entries.get_mut(text) {
            *slot = handle;
            return;
        }
        self.entries.insert(text.to_string(), handle);
        self.order.push_back(text.to_string());

        while self.entries.len() > self.capacity {
            let playing = self.playing;
            let Some(pos) = self
                .order
                .iter()
                .position(|key| Some(self.entries[key].id()) != playing)
            else {
                break;
            };
            if let Some(key) = self.order.remove(pos) {
                if let Some(evicted) = self.entries.remove(&key) {
                    debug!(clip = ?evicted.id(), "Evicted cached speech");
                }
            }
        }
    }

    /// Marks the clip the active session is playing, protecting it from eviction.
    pub fn set_playing(&mut self, clip: Option<ClipId>) {
        self.playing = clip;
    }

    pub fn playing(&self) -> Option<ClipId> {
        self.playing
    }

    /// Clear `playing` only if it still names `clip`.
    pub fn finish_playing(&mut self, clip: ClipId) {
        if self.playing == Some(clip) {
            self.playing = None;
        }
    }

    /// Full teardown. A clip that is still playing survives in the sink
    /// until its session ends.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached texts, oldest first.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl Default for SpeechCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
