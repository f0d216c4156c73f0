use crate::lesson;
use crate::narrator::Narrator;
use crate::playback::PlaybackState;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use zbus::{interface, SignalContext};

pub const BUS_NAME: &str = "org.lucid.Narrator";
pub const OBJECT_PATH: &str = "/org/lucid/Narrator";

pub struct NarratorService {
    narrator: Narrator,
    next_lesson: AtomicU64,
}

impl NarratorService {
    pub fn new(narrator: Narrator) -> Self {
        Self {
            narrator,
            next_lesson: AtomicU64::new(1),
        }
    }
}

pub fn state_name(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "idle",
        PlaybackState::Fetching => "fetching",
        PlaybackState::Playing => "playing",
        PlaybackState::FallbackPlaying => "fallback-playing",
    }
}

#[interface(name = "org.lucid.Narrator")]
impl NarratorService {
    #[zbus(name = "Ping")]
    async fn ping(&self) -> String {
        "pong".to_string()
    }

    #[zbus(name = "GetVersion")]
    async fn get_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Returns the utterance's generation; `SpeechFinished` reports its end.
    #[zbus(name = "Speak")]
    async fn speak(&self, #[zbus(signal_context)] ctxt: SignalContext<'_>, text: String) -> u64 {
        let utterance = self.narrator.speak(&text);
        let generation = utterance.generation();
        let ctxt = ctxt.to_owned();

        tokio::spawn(async move {
            // Superseded utterances never report.
            let Some(completion) = utterance.finished().await else {
                return;
            };
            let detail = completion
                .error()
                .map(ToString::to_string)
                .unwrap_or_default();
            if let Err(e) =
                Self::speech_finished(&ctxt, generation, completion.as_str(), &detail).await
            {
                warn!("Failed to emit SpeechFinished: {}", e);
            }
        });

        generation
    }

    #[zbus(name = "CancelSpeech")]
    async fn cancel_speech(&self) {
        self.narrator.cancel_speech();
    }

    #[zbus(name = "PrefetchSpeech")]
    async fn prefetch_speech(&self, text: String) -> bool {
        self.narrator.prefetch_speech(&text)
    }

    #[zbus(name = "PrefetchAllScenes")]
    async fn prefetch_all_scenes(&self, narrations: Vec<String>) {
        info!("Prefetching {} scene narrations", narrations.len());
        self.narrator.prefetch_all_scenes(&narrations);
    }

    #[zbus(name = "CancelAllPrefetches")]
    async fn cancel_all_prefetches(&self) -> u32 {
        self.narrator.cancel_all_prefetches() as u32
    }

    #[zbus(name = "ClearCache")]
    async fn clear_cache(&self) {
        self.narrator.clear_cache();
    }

    #[zbus(name = "GetCacheStatus")]
    async fn get_cache_status(&self) -> (u32, u32, u32, String) {
        let status = self.narrator.status();
        (
            status.cached as u32,
            status.capacity as u32,
            status.pending as u32,
            state_name(status.state).to_string(),
        )
    }

    /// Narrates scenes in order in the background; `LessonFinished` reports
    /// how far it got.
    #[zbus(name = "NarrateScenes")]
    async fn narrate_scenes(
        &self,
        #[zbus(signal_context)] ctxt: SignalContext<'_>,
        scenes: Vec<String>,
    ) -> u64 {
        let lesson = self.next_lesson.fetch_add(1, Ordering::Relaxed);
        let narrator = self.narrator.clone();
        let ctxt = ctxt.to_owned();
        info!(lesson, "Narrating {} scenes", scenes.len());

        tokio::spawn(async move {
            let outcome = lesson::narrate_scenes(&narrator, &scenes).await;
            if let Err(e) = Self::lesson_finished(
                &ctxt,
                lesson,
                outcome.spoken as u32,
                outcome.interrupted,
            )
            .await
            {
                warn!("Failed to emit LessonFinished: {}", e);
            }
        });

        lesson
    }

    #[zbus(signal)]
    async fn speech_finished(
        ctxt: &SignalContext<'_>,
        generation: u64,
        outcome: &str,
        detail: &str,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn lesson_finished(
        ctxt: &SignalContext<'_>,
        lesson: u64,
        spoken: u32,
        interrupted: bool,
    ) -> zbus::Result<()>;
}
