use crate::backends::SpeechBackend;
use crate::engine::{AudioHandle, AudioSink, ClipId, PlaybackEvent};
use crate::error::SpeechError;
use crate::fallback::FallbackSynthesizer;
use crate::prefetch::{preview, PendingResult};
use crate::store::{lock, Lookup, SharedStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// How an utterance ended. Delivered at most once; a superseded utterance
/// gets nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Played to the end.
    Ended,
    /// The audio itself failed (e.g. could not be decoded).
    Failed(SpeechError),
    /// Local synthesis failed. Still counts as ended so narration keeps
    /// moving.
    EndedAfterError(SpeechError),
}

impl Completion {
    /// Whether the utterance counts as finished for sequencing.
    pub fn is_ended(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn error(&self) -> Option<&SpeechError> {
        match self {
            Self::Ended => None,
            Self::Failed(e) | Self::EndedAfterError(e) => Some(e),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ended => "ended",
            Self::Failed(_) => "errored",
            Self::EndedAfterError(_) => "ended-after-error",
        }
    }
}

/// Where the current session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Fetching,
    Playing,
    FallbackPlaying,
}

/// Handle to one `speak` call.
#[derive(Debug)]
pub struct Utterance {
    generation: u64,
    done: oneshot::Receiver<Completion>,
}

impl Utterance {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the outcome. `None` means the utterance was superseded by a
    /// later `speak` or a `cancel`.
    pub async fn finished(self) -> Option<Completion> {
        self.done.await.ok()
    }
}

type EndCallback = Box<dyn FnOnce() + Send>;
type ErrorCallback = Box<dyn FnOnce(SpeechError) + Send>;

/// Callback form of [`Completion`], for callers that sequence on events.
#[derive(Default)]
pub struct SpeakOptions {
    on_end: Option<EndCallback>,
    on_error: Option<ErrorCallback>,
}

impl SpeakOptions {
    pub fn on_end(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(SpeechError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    fn dispatch(self, completion: Completion) {
        match completion {
            Completion::Ended => {
                if let Some(on_end) = self.on_end {
                    on_end();
                }
            }
            Completion::Failed(e) => {
                if let Some(on_error) = self.on_error {
                    on_error(e);
                }
            }
            Completion::EndedAfterError(e) => {
                if let Some(on_error) = self.on_error {
                    on_error(e);
                }
                if let Some(on_end) = self.on_end {
                    on_end();
                }
            }
        }
    }
}

struct Session {
    generation: u64,
    task: AbortHandle,
    state: PlaybackState,
}

enum Start {
    Playing(ClipId, oneshot::Receiver<PlaybackEvent>),
    Pending(PendingResult),
    Fetch,
}

/// Owns the single live playback session.
///
/// Every `speak` or `cancel` bumps the generation. Asynchronous steps carry
/// the generation they started with and do nothing once it is outdated, so
/// a slow fetch can never start audio the user already moved past.
#[derive(Clone)]
pub struct PlaybackController {
    backend: Arc<dyn SpeechBackend>,
    sink: Arc<dyn AudioSink>,
    fallback: FallbackSynthesizer,
    store: SharedStore,
    generation: Arc<AtomicU64>,
    session: Arc<Mutex<Option<Session>>>,
}

impl PlaybackController {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        sink: Arc<dyn AudioSink>,
        fallback: FallbackSynthesizer,
        store: SharedStore,
    ) -> Self {
        Self {
            backend,
            sink,
            fallback,
            store,
            generation: Arc::new(AtomicU64::new(0)),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace whatever is playing with `text`.
    ///
    /// Audio comes from the cache, else from a pending prefetch, else from a
    /// direct fetch; a failed backend falls back to the local voice. Empty
    /// text completes as [`Completion::Ended`] immediately.
    pub fn speak(&self, text: &str) -> Utterance {
        // Held from teardown until the new session is installed: concurrent
        // callers get distinct generations and the spawned task cannot act
        // before it is registered.
        let mut session = lock(&self.session);
        let generation = self.teardown_locked(&mut session);

        let (done_tx, done_rx) = oneshot::channel();
        let text = text.trim();

        if text.is_empty() {
            let _ = done_tx.send(Completion::Ended);
            return Utterance {
                generation,
                done: done_rx,
            };
        }

        let lookup = lock(&self.store).lookup(text);
        let (state, start) = match lookup {
            Lookup::Cached(clip) => {
                debug!(generation, "Cache hit for '{}'", preview(text));
                let (id, events) = self.start_clip(clip);
                (PlaybackState::Playing, Start::Playing(id, events))
            }
            Lookup::Pending(result) => {
                debug!(generation, "Joining pending prefetch for '{}'", preview(text));
                (PlaybackState::Fetching, Start::Pending(result))
            }
            Lookup::Missing => {
                debug!(generation, "Fetching '{}'", preview(text));
                (PlaybackState::Fetching, Start::Fetch)
            }
        };

        let controller = self.clone();
        let owned = text.to_string();
        let task = tokio::spawn(async move {
            controller.run_session(generation, owned, start, done_tx).await;
        });
        *session = Some(Session {
            generation,
            task: task.abort_handle(),
            state,
        });

        Utterance {
            generation,
            done: done_rx,
        }
    }

    /// [`speak`](Self::speak) with callbacks. An already-settled utterance
    /// (empty text) runs its callback before this returns.
    pub fn speak_with(&self, text: &str, options: SpeakOptions) -> u64 {
        let mut utterance = self.speak(text);
        let generation = utterance.generation;
        match utterance.done.try_recv() {
            Ok(completion) => options.dispatch(completion),
            Err(TryRecvError::Empty) => {
                tokio::spawn(async move {
                    if let Some(completion) = utterance.finished().await {
                        options.dispatch(completion);
                    }
                });
            }
            Err(TryRecvError::Closed) => {}
        }
        generation
    }

    /// Tear down the current session without reporting anything.
    ///
    /// Aborts an in-flight direct fetch, stops audio and local speech. Prefetch
    /// requests are independent and keep running.
    pub fn cancel(&self) {
        let mut session = lock(&self.session);
        self.teardown_locked(&mut session);
    }

    /// Starts a new generation and stops everything the old one owned.
    /// Caller must hold the session lock.
    fn teardown_locked(&self, session: &mut Option<Session>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = session.take() {
            previous.task.abort();
            debug!(
                cancelled = previous.generation,
                generation, "Cancelled playback session"
            );
        }
        self.sink.stop();
        self.fallback.cancel();
        lock(&self.store).cache.set_playing(None);
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.session)
            .as_ref()
            .map_or(PlaybackState::Idle, |s| s.state)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Caller must hold the session lock.
    fn start_clip(&self, clip: AudioHandle) -> (ClipId, oneshot::Receiver<PlaybackEvent>) {
        let id = clip.id();
        lock(&self.store).cache.set_playing(Some(id));
        (id, self.sink.play(clip))
    }

    fn play_if_current(
        &self,
        generation: u64,
        clip: AudioHandle,
    ) -> Option<(ClipId, oneshot::Receiver<PlaybackEvent>)> {
        let mut session = lock(&self.session);
        if !self.is_current(generation) {
            debug!(generation, "Discarding stale audio for '{}'", preview(clip.text()));
            return None;
        }
        if let Some(s) = session.as_mut() {
            s.state = PlaybackState::Playing;
        }
        Some(self.start_clip(clip))
    }

    /// Ends the session if it is still `generation`; the task is ours, so it
    /// is not aborted.
    fn finish(&self, generation: u64) -> bool {
        let mut session = lock(&self.session);
        if !self.is_current(generation) {
            return false;
        }
        if session.as_ref().is_some_and(|s| s.generation == generation) {
            session.take();
        }
        true
    }

    async fn run_session(
        self,
        generation: u64,
        text: String,
        start: Start,
        done: oneshot::Sender<Completion>,
    ) {
        let started = match start {
            Start::Playing(id, events) => Some((id, events)),
            Start::Pending(result) => {
                let result = result.await;
                if !self.is_current(generation) {
                    debug!(generation, "Ignoring stale prefetch result");
                    return;
                }
                match result {
                    Ok(clip) => self.play_if_current(generation, clip),
                    Err(e) => {
                        warn!("Speech backend failed for '{}' ({}), using local voice", preview(&text), e);
                        return self.fall_back(generation, &text, done).await;
                    }
                }
            }
            Start::Fetch => {
                let result = self.backend.synthesize(&text).await;
                if !self.is_current(generation) {
                    debug!(generation, "Ignoring stale fetch result");
                    return;
                }
                match result {
                    Ok(bytes) => {
                        let clip = AudioHandle::new(text.clone(), bytes);
                        lock(&self.store).cache.put(&text, clip.clone());
                        self.play_if_current(generation, clip)
                    }
                    Err(e) => {
                        warn!(backend = self.backend.id(), "Speech backend failed for '{}' ({}), using local voice", preview(&text), e);
                        return self.fall_back(generation, &text, done).await;
                    }
                }
            }
        };
        let Some((clip, events)) = started else {
            return;
        };

        // A dropped sender means the sink was stopped: nothing to report.
        let Ok(event) = events.await else {
            return;
        };
        lock(&self.store).cache.finish_playing(clip);
        if !self.finish(generation) {
            return;
        }
        let completion = match event {
            PlaybackEvent::Finished => Completion::Ended,
            PlaybackEvent::Failed(e) => {
                warn!(clip = ?clip, "Playback failed: {}", e);
                Completion::Failed(e)
            }
        };
        let _ = done.send(completion);
    }

    async fn fall_back(&self, generation: u64, text: &str, done: oneshot::Sender<Completion>) {
        let utterance = {
            let mut session = lock(&self.session);
            if !self.is_current(generation) {
                return;
            }
            if let Some(s) = session.as_mut() {
                s.state = PlaybackState::FallbackPlaying;
            }
            self.fallback.speak(text)
        };

        if let Ok(completion) = utterance.await {
            if self.finish(generation) {
                let _ = done.send(completion);
            }
        }
    }
}
