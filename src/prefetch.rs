use crate::backends::SpeechBackend;
use crate::engine::AudioHandle;
use crate::error::SpeechError;
use crate::store::{lock, SharedStore};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::debug;

pub const DEFAULT_STAGGER: Duration = Duration::from_millis(150);

/// Result of an in-flight fetch, awaitable by any number of waiters.
pub type PendingResult = Shared<BoxFuture<'static, Result<AudioHandle, SpeechError>>>;

/// A fetch that has been issued but not settled yet.
pub struct PendingRequest {
    id: u64,
    result: PendingResult,
    task: AbortHandle,
}

impl PendingRequest {
    pub fn result(&self) -> PendingResult {
        self.result.clone()
    }
}

/// Fetches narration audio ahead of need and files it in the cache.
///
/// Prefetching is best effort: failures are logged at debug level and never
/// surface, so a later `speak` simply falls through to a direct fetch.
#[derive(Clone)]
pub struct PrefetchCoordinator {
    backend: Arc<dyn SpeechBackend>,
    store: SharedStore,
    stagger: Duration,
    next_request: Arc<AtomicU64>,
    /// Staggered batch items that have not fired yet.
    scheduled: Arc<Mutex<Vec<AbortHandle>>>,
}

impl PrefetchCoordinator {
    pub fn new(backend: Arc<dyn SpeechBackend>, store: SharedStore, stagger: Duration) -> Self {
        Self {
            backend,
            store,
            stagger,
            next_request: Arc::new(AtomicU64::new(1)),
            scheduled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start fetching `text` unless it is empty, cached or already pending.
    /// Returns whether a request was issued.
    pub fn prefetch_one(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let mut store = lock(&self.store);
        if store.is_known(text) {
            return false;
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let backend = self.backend.clone();
        let shared_store = self.store.clone();
        let key = text.to_string();

        // The lock is held until the request is registered, so the task
        // cannot settle before its pending entry exists.
        let task = tokio::spawn(async move {
            let result = backend
                .synthesize(&key)
                .await
                .map(|bytes| AudioHandle::new(key.clone(), bytes));

            let mut store = lock(&shared_store);
            if store.pending.get(&key).is_some_and(|p| p.id == id) {
                store.pending.remove(&key);
            }
            match &result {
                Ok(handle) => {
                    debug!(clip = ?handle.id(), bytes = handle.len(), "Prefetched '{}'", preview(&key));
                    store.cache.put(&key, handle.clone());
                }
                Err(e) => debug!("Prefetch of '{}' failed: {}", preview(&key), e),
            }
            result
        });

        let abort = task.abort_handle();
        let result = async move {
            match task.await {
                Ok(result) => result,
                Err(_) => Err(SpeechError::Cancelled),
            }
        }
        .boxed()
        .shared();

        store.pending.insert(
            text.to_string(),
            PendingRequest {
                id,
                result,
                task: abort,
            },
        );
        true
    }

    /// Prefetch a batch: de-duplicated, first item now, item `i` after
    /// `i * stagger`. Each delayed item re-checks the store when it fires.
    pub fn prefetch_batch<I, S>(&self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = texts
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();

        let mut scheduled = lock(&self.scheduled);
        scheduled.retain(|timer| !timer.is_finished());

        for (index, text) in unique.into_iter().enumerate() {
            if index == 0 {
                self.prefetch_one(&text);
                continue;
            }
            let delay = self.stagger * index as u32;
            let coordinator = self.clone();
            let timer = tokio::spawn(async move {
                sleep(delay).await;
                if !coordinator.prefetch_one(&text) {
                    debug!("Skipping prefetch of '{}': already cached or pending", preview(&text));
                }
            });
            scheduled.push(timer.abort_handle());
        }
    }

    /// Abort every in-flight prefetch and every batch item not yet fired.
    /// Cached entries are left alone.
    pub fn cancel_all(&self) -> usize {
        for timer in lock(&self.scheduled).drain(..) {
            timer.abort();
        }

        let drained: Vec<(String, PendingRequest)> = lock(&self.store).pending.drain().collect();
        for (text, request) in &drained {
            request.task.abort();
            debug!(request = request.id, "Cancelled prefetch of '{}'", preview(text));
        }
        drained.len()
    }
}

/// First few words of a narration, for log lines.
pub(crate) fn preview(text: &str) -> String {
    const MAX: usize = 40;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{}…", head)
    }
}
