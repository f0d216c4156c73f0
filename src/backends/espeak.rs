use super::{LocalVoice, VoiceParams};
use crate::error::SpeechError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// espeak-ng's default speaking rate in words per minute.
const BASE_WPM: f32 = 175.0;
/// espeak-ng's default pitch on its 0-99 scale.
const BASE_PITCH: f32 = 50.0;

/// Local voice backed by the espeak-ng binary, played straight to the
/// default output device.
pub struct EspeakVoice {
    binary_path: String,
}

impl EspeakVoice {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn args(text: &str, params: &VoiceParams) -> Vec<String> {
        let wpm = (BASE_WPM * params.rate).round().max(1.0) as u32;
        let pitch = (BASE_PITCH * params.pitch).round().clamp(0.0, 99.0) as u32;

        let mut args = vec![
            "-s".to_string(),
            wpm.to_string(),
            "-p".to_string(),
            pitch.to_string(),
        ];
        if let Some(voice) = &params.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push(text.to_string());
        args
    }
}

impl Default for EspeakVoice {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

#[async_trait]
impl LocalVoice for EspeakVoice {
    fn id(&self) -> &'static str {
        "espeak-ng"
    }

    async fn utter(&self, text: &str, params: &VoiceParams) -> Result<(), SpeechError> {
        // kill_on_drop: cancelling the utterance silences the voice
        let output = Command::new(&self.binary_path)
            .args(Self::args(text, params))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SpeechError::Synthesis(format!("{}: {}", self.binary_path, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            Err(SpeechError::Synthesis(format!(
                "espeak error ({}): {}",
                output.status,
                err_msg.trim()
            )))
        }
    }
}
