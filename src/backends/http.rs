use super::SpeechBackend;
use crate::config_loader::Settings;
use crate::error::SpeechError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Longest slice of an error body kept in [`SpeechError::BackendStatus`].
const MAX_DETAIL_CHARS: usize = 200;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
}

/// Backend that POSTs `{ "text": ... }` to the tutoring API's TTS endpoint
/// and receives the audio bytes.
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    voice_id: Option<String>,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            voice_id: None,
            auth_token: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SpeechError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: settings.tts_url.clone(),
            voice_id: settings.voice_id().map(str::to_string),
            auth_token: settings.auth_token().map(str::to_string),
        })
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[async_trait]
impl SpeechBackend for HttpBackend {
    fn id(&self) -> &'static str {
        "http"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let mut request = self.client.post(&self.endpoint).json(&SpeechRequest {
            text,
            voice_id: self.voice_id.as_deref(),
        });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::BackendStatus {
                status: status.as_u16(),
                detail: body.chars().take(MAX_DETAIL_CHARS).collect(),
            });
        }

        let audio = resp.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        debug!(bytes = audio.len(), "Speech backend returned audio");
        Ok(audio.to_vec())
    }
}
