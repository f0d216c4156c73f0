pub mod espeak;
pub mod http;

use crate::error::SpeechError;
use async_trait::async_trait;

/// Primary speech backend: turns narration text into a playable audio payload.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Returns the encoded audio for `text`, or why it could not.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;

    /// Returns the unique ID of the backend (e.g., "http")
    fn id(&self) -> &'static str;
}

/// Speaking parameters for the local voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<String>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            rate: 0.95,
            pitch: 1.0,
            voice: None,
        }
    }
}

/// Local speech synthesis that speaks directly to the output device.
///
/// `utter` resolves when the utterance finished or failed. Dropping the
/// future must silence the voice.
#[async_trait]
pub trait LocalVoice: Send + Sync {
    async fn utter(&self, text: &str, params: &VoiceParams) -> Result<(), SpeechError>;

    fn id(&self) -> &'static str;
}
