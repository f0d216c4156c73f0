#![allow(dead_code)]

use async_trait::async_trait;
use lucid_narrator::backends::{LocalVoice, SpeechBackend, VoiceParams};
use lucid_narrator::engine::{AudioHandle, AudioSink, PlaybackEvent};
use lucid_narrator::{Narrator, NarratorConfig, SpeechError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub fn wav(text: &str) -> Vec<u8> {
    format!("RIFF:{text}").into_bytes()
}

pub fn unavailable() -> SpeechError {
    SpeechError::BackendStatus {
        status: 503,
        detail: "Cartesia API unreachable".into(),
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

type Gate = oneshot::Sender<Result<Vec<u8>, SpeechError>>;

/// Backend whose requests stay in flight until the test releases them.
#[derive(Default)]
pub struct GatedBackend {
    calls: Mutex<Vec<(String, Instant)>>,
    gates: Mutex<HashMap<String, Vec<Gate>>>,
}

impl GatedBackend {
    /// Settle the oldest open request for `text`. False if there is none or
    /// its requester has gone away (aborted).
    pub fn release(&self, text: &str, result: Result<Vec<u8>, SpeechError>) -> bool {
        let gate = {
            let mut gates = self.gates.lock().unwrap();
            match gates.get_mut(text) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => return false,
            }
        };
        gate.send(result).is_ok()
    }

    pub fn succeed(&self, text: &str) -> bool {
        self.release(text, Ok(wav(text)))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn call_count(&self, text: &str) -> usize {
        self.calls().iter().filter(|t| t.as_str() == text).count()
    }

    /// When each request was issued, relative to `start`.
    pub fn issued_after(&self, start: Instant) -> Vec<(String, Duration)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(text, at)| (text.clone(), at.duration_since(start)))
            .collect()
    }
}

#[async_trait]
impl SpeechBackend for GatedBackend {
    fn id(&self) -> &'static str {
        "gated"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), Instant::now()));
        self.gates
            .lock()
            .unwrap()
            .entry(text.to_string())
            .or_default()
            .push(tx);
        rx.await.unwrap_or(Err(SpeechError::Cancelled))
    }
}

/// Backend that answers at once, failing for the listed texts.
#[derive(Default)]
pub struct InstantBackend {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl InstantBackend {
    pub fn failing(texts: &[&str]) -> Self {
        Self {
            failing: texts.iter().map(|t| t.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechBackend for InstantBackend {
    fn id(&self) -> &'static str {
        "instant"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.failing.contains(text) {
            Err(unavailable())
        } else {
            Ok(wav(text))
        }
    }
}

struct Play {
    clip: AudioHandle,
    done: Option<oneshot::Sender<PlaybackEvent>>,
}

/// Sink that records what it was asked to play. Playback finishes when the
/// test says so, or immediately with `auto_finish`.
#[derive(Default)]
pub struct RecordingSink {
    plays: Mutex<Vec<Play>>,
    stops: AtomicUsize,
    auto_finish: bool,
}

impl RecordingSink {
    pub fn auto_finish() -> Self {
        Self {
            auto_finish: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.plays
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.clip.text().to_string())
            .collect()
    }

    pub fn finish_last(&self) -> bool {
        self.settle_last(PlaybackEvent::Finished)
    }

    pub fn fail_last(&self, err: SpeechError) -> bool {
        self.settle_last(PlaybackEvent::Failed(err))
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn settle_last(&self, event: PlaybackEvent) -> bool {
        let done = self
            .plays
            .lock()
            .unwrap()
            .last_mut()
            .and_then(|p| p.done.take());
        done.is_some_and(|tx| tx.send(event).is_ok())
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, clip: AudioHandle) -> oneshot::Receiver<PlaybackEvent> {
        let (tx, rx) = oneshot::channel();
        let done = if self.auto_finish {
            let _ = tx.send(PlaybackEvent::Finished);
            None
        } else {
            Some(tx)
        };
        self.plays.lock().unwrap().push(Play { clip, done });
        rx
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        for play in self.plays.lock().unwrap().iter_mut() {
            play.done.take();
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq)]
pub enum VoiceMode {
    #[default]
    Speak,
    Fail,
    /// Never finishes on its own.
    Hang,
}

#[derive(Default)]
pub struct FakeVoice {
    mode: VoiceMode,
    utterances: Mutex<Vec<String>>,
}

impl FakeVoice {
    pub fn new(mode: VoiceMode) -> Self {
        Self {
            mode,
            utterances: Mutex::new(Vec::new()),
        }
    }

    pub fn utterances(&self) -> Vec<String> {
        self.utterances.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalVoice for FakeVoice {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn utter(&self, text: &str, _params: &VoiceParams) -> Result<(), SpeechError> {
        self.utterances.lock().unwrap().push(text.to_string());
        match self.mode {
            VoiceMode::Speak => Ok(()),
            VoiceMode::Fail => Err(SpeechError::Synthesis("no local voice installed".into())),
            VoiceMode::Hang => std::future::pending().await,
        }
    }
}

pub struct Harness<B> {
    pub narrator: Narrator,
    pub backend: Arc<B>,
    pub sink: Arc<RecordingSink>,
    pub voice: Arc<FakeVoice>,
}

pub fn harness<B>(backend: B, sink: RecordingSink, voice: VoiceMode, capacity: usize) -> Harness<B>
where
    B: SpeechBackend + 'static,
{
    let backend = Arc::new(backend);
    let sink = Arc::new(sink);
    let voice = Arc::new(FakeVoice::new(voice));
    let config = NarratorConfig {
        cache_capacity: capacity,
        ..NarratorConfig::default()
    };
    let narrator = Narrator::new(backend.clone(), sink.clone(), voice.clone(), config);
    Harness {
        narrator,
        backend,
        sink,
        voice,
    }
}

pub fn gated() -> Harness<GatedBackend> {
    harness(
        GatedBackend::default(),
        RecordingSink::default(),
        VoiceMode::Speak,
        30,
    )
}
