use crate::backends::espeak::EspeakVoice;
use crate::backends::http::HttpBackend;
use crate::backends::{LocalVoice, SpeechBackend, VoiceParams};
use crate::cache::DEFAULT_CAPACITY;
use crate::config_loader::Settings;
use crate::engine::{AudioSink, RodioSink};
use crate::error::SpeechError;
use crate::fallback::FallbackSynthesizer;
use crate::playback::{PlaybackController, PlaybackState, SpeakOptions, Utterance};
use crate::prefetch::{PrefetchCoordinator, DEFAULT_STAGGER};
use crate::store::{lock, SharedStore, SpeechStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct NarratorConfig {
    pub cache_capacity: usize,
    pub prefetch_stagger: Duration,
    pub voice: VoiceParams,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            prefetch_stagger: DEFAULT_STAGGER,
            voice: VoiceParams::default(),
        }
    }
}

impl From<&Settings> for NarratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            cache_capacity: settings.cache_capacity,
            prefetch_stagger: settings.prefetch_stagger(),
            voice: VoiceParams {
                rate: settings.fallback_rate,
                pitch: settings.fallback_pitch,
                voice: settings.fallback_voice().map(str::to_string),
            },
        }
    }
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarratorStatus {
    pub cached: usize,
    pub capacity: usize,
    pub pending: usize,
    pub state: PlaybackState,
}

/// The narration service: one instance per application (or per test).
///
/// Owns the speech cache, the pending-prefetch map and the playback
/// session. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct Narrator {
    store: SharedStore,
    prefetch: PrefetchCoordinator,
    playback: PlaybackController,
}

impl Narrator {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        sink: Arc<dyn AudioSink>,
        voice: Arc<dyn LocalVoice>,
        config: NarratorConfig,
    ) -> Self {
        let store = SpeechStore::shared(config.cache_capacity);
        let fallback = FallbackSynthesizer::new(voice, config.voice);
        let prefetch = PrefetchCoordinator::new(backend.clone(), store.clone(), config.prefetch_stagger);
        let playback = PlaybackController::new(backend, sink, fallback, store.clone());
        Self {
            store,
            prefetch,
            playback,
        }
    }

    /// HTTP backend, rodio output and espeak-ng fallback, all from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, SpeechError> {
        let backend = HttpBackend::from_settings(settings)?;
        let sink = RodioSink::new(settings.playback_volume);
        let voice = EspeakVoice::new(settings.fallback_binary.clone());
        info!(
            tts_url = %settings.tts_url,
            capacity = settings.cache_capacity,
            fallback = %settings.fallback_binary,
            "Narrator configured"
        );
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(sink),
            Arc::new(voice),
            NarratorConfig::from(settings),
        ))
    }

    pub fn speak(&self, text: &str) -> Utterance {
        self.playback.speak(text)
    }

    pub fn speak_with(&self, text: &str, options: SpeakOptions) -> u64 {
        self.playback.speak_with(text, options)
    }

    pub fn cancel_speech(&self) {
        self.playback.cancel();
    }

    pub fn prefetch_speech(&self, text: &str) -> bool {
        self.prefetch.prefetch_one(text)
    }

    pub fn prefetch_all_scenes<I, S>(&self, narrations: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prefetch.prefetch_batch(narrations);
    }

    pub fn cancel_all_prefetches(&self) -> usize {
        self.prefetch.cancel_all()
    }

    /// Drop every cached clip. The one playing, if any, lives until it ends.
    pub fn clear_cache(&self) {
        lock(&self.store).cache.clear();
    }

    pub fn is_cached(&self, text: &str) -> bool {
        lock(&self.store).cache.contains(text.trim())
    }

    pub fn status(&self) -> NarratorStatus {
        let state = self.playback.state();
        let store = lock(&self.store);
        NarratorStatus {
            cached: store.cache.len(),
            capacity: store.cache.capacity(),
            pending: store.pending.len(),
            state,
        }
    }
}
