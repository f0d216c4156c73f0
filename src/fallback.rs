use crate::backends::{LocalVoice, VoiceParams};
use crate::playback::Completion;
use crate::prefetch::preview;
use crate::store::lock;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Lower-quality local speech, used when the primary backend fails.
///
/// A failed utterance still completes as finished
/// ([`Completion::EndedAfterError`]): whoever sequences narration on "ended"
/// must not be stalled by a broken local voice.
#[derive(Clone)]
pub struct FallbackSynthesizer {
    voice: Arc<dyn LocalVoice>,
    params: VoiceParams,
    current: Arc<Mutex<Option<AbortHandle>>>,
}

impl FallbackSynthesizer {
    pub fn new(voice: Arc<dyn LocalVoice>, params: VoiceParams) -> Self {
        Self {
            voice,
            params,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancel any previous utterance and speak `text`.
    ///
    /// The receiver yields exactly one [`Completion`], or a closed channel if
    /// the utterance is cancelled first.
    pub fn speak(&self, text: &str) -> oneshot::Receiver<Completion> {
        self.cancel();

        let (done_tx, done_rx) = oneshot::channel();
        let voice = self.voice.clone();
        let params = self.params.clone();
        let text = text.to_string();

        let mut current = lock(&self.current);
        let task = tokio::spawn(async move {
            debug!(voice = voice.id(), "Speaking '{}' locally", preview(&text));
            let completion = match voice.utter(&text, &params).await {
                Ok(()) => Completion::Ended,
                Err(e) => {
                    warn!(voice = voice.id(), "Local synthesis failed: {}", e);
                    Completion::EndedAfterError(e)
                }
            };
            let _ = done_tx.send(completion);
        });
        *current = Some(task.abort_handle());

        done_rx
    }

    /// Silence the current utterance, if any. No completion is delivered.
    pub fn cancel(&self) {
        if let Some(task) = lock(&self.current).take() {
            task.abort();
        }
    }
}
