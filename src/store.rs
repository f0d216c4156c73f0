//! State shared by prefetching and playback: the speech cache and the set of
//! in-flight prefetch requests, behind one lock so "cached or pending?" is a
//! single atomic question.

use crate::cache::SpeechCache;
use crate::engine::AudioHandle;
use crate::prefetch::{PendingRequest, PendingResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type SharedStore = Arc<Mutex<SpeechStore>>;

pub struct SpeechStore {
    pub cache: SpeechCache,
    pub pending: HashMap<String, PendingRequest>,
}

/// Where audio for a text can come from right now.
pub enum Lookup {
    Cached(AudioHandle),
    Pending(PendingResult),
    Missing,
}

impl SpeechStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: SpeechCache::new(capacity),
            pending: HashMap::new(),
        }
    }

    pub fn shared(capacity: usize) -> SharedStore {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    pub fn lookup(&self, text: &str) -> Lookup {
        if let Some(handle) = self.cache.get(text) {
            Lookup::Cached(handle)
        } else if let Some(request) = self.pending.get(text) {
            Lookup::Pending(request.result())
        } else {
            Lookup::Missing
        }
    }

    pub fn is_known(&self, text: &str) -> bool {
        self.cache.contains(text) || self.pending.contains_key(text)
    }
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
///
/// Every critical section here leaves the data consistent before it can
/// panic, so a poisoned lock is still safe to use.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
