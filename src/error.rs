//! Error taxonomy for the narration subsystem.
//!
//! None of these reach a caller of [`crate::narrator::Narrator`] as a hard
//! failure: backend errors turn into local fallback, prefetch errors are
//! swallowed, and playback errors are delivered through a
//! [`crate::playback::Completion`].

/// Errors produced while fetching, synthesizing or playing speech.
///
/// `Clone` because one pending prefetch result can be awaited by several
/// waiters at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    /// The speech backend answered with a non-success status.
    #[error("speech backend returned {status}: {detail}")]
    BackendStatus { status: u16, detail: String },

    /// The request never produced a response.
    #[error("speech backend unreachable: {0}")]
    Network(String),

    /// The configured request timeout elapsed.
    #[error("speech backend timed out")]
    Timeout,

    /// The backend answered 2xx with no audio.
    #[error("speech backend returned an empty audio payload")]
    EmptyAudio,

    /// The request was aborted before it settled.
    #[error("speech request cancelled")]
    Cancelled,

    /// The audio payload could not be decoded.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// No usable output device.
    #[error("audio output unavailable: {0}")]
    Device(String),

    /// Local synthesis failed.
    #[error("local speech synthesis failed: {0}")]
    Synthesis(String),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}
