use config::{Config, ConfigBuilder, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Speech backend
    pub tts_url: String,
    pub voice_id: String,   // empty = backend default voice
    pub auth_token: String, // sent as a bearer token when non-empty
    pub request_timeout_secs: u64, // 0 = wait for the backend indefinitely
    // Cache and prefetch
    pub cache_capacity: usize,
    pub prefetch_stagger_ms: u64,
    // Local fallback voice
    pub fallback_binary: String,
    pub fallback_voice: String,
    pub fallback_rate: f32,
    pub fallback_pitch: f32,
    // Output
    pub playback_volume: f32, // 0.0 - 1.0
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tts_url: "http://localhost:8000/tts".to_string(),
            voice_id: String::new(),
            auth_token: String::new(),
            request_timeout_secs: 0,
            cache_capacity: 30,
            prefetch_stagger_ms: 150,
            fallback_binary: "espeak-ng".to_string(),
            fallback_voice: String::new(),
            fallback_rate: 0.95,
            fallback_pitch: 1.0,
            playback_volume: 1.0,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `Narrator.*` in the working directory, then the user
    /// config file, then `NARRATOR_*` environment variables.
    pub fn new() -> Result<Self, config::ConfigError> {
        let user_config = dirs::config_dir()
            .map(|dir| dir.join("lucid-narrator").join("Narrator"))
            .and_then(|path| path.to_str().map(str::to_string));

        let mut builder = Self::defaults()?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Narrator").required(false));
        if let Some(path) = user_config {
            builder = builder.add_source(File::with_name(&path).required(false));
        }
        // e.g. NARRATOR_TTS_URL
        builder = builder.add_source(config::Environment::with_prefix("NARRATOR"));

        Self::finish(builder)
    }

    /// Defaults overlaid with a single explicit file.
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = Self::defaults()?.add_source(File::from(path));
        Self::finish(builder)
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let d = Self::default();
        Config::builder()
            .set_default("tts_url", d.tts_url)?
            .set_default("voice_id", d.voice_id)?
            .set_default("auth_token", d.auth_token)?
            .set_default("request_timeout_secs", d.request_timeout_secs)?
            .set_default("cache_capacity", d.cache_capacity as u64)?
            .set_default("prefetch_stagger_ms", d.prefetch_stagger_ms)?
            .set_default("fallback_binary", d.fallback_binary)?
            .set_default("fallback_voice", d.fallback_voice)?
            .set_default("fallback_rate", f64::from(d.fallback_rate))?
            .set_default("fallback_pitch", f64::from(d.fallback_pitch))?
            .set_default("playback_volume", f64::from(d.playback_volume))?
            .set_default("log_filter", d.log_filter)
    }

    fn finish(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.tts_url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "tts_url must not be empty".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(config::ConfigError::Message(
                "cache_capacity must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.playback_volume) {
            return Err(config::ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        if self.fallback_rate <= 0.0 || self.fallback_pitch <= 0.0 {
            return Err(config::ConfigError::Message(
                "fallback_rate and fallback_pitch must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn prefetch_stagger(&self) -> Duration {
        Duration::from_millis(self.prefetch_stagger_ms)
    }

    /// Empty strings in the file mean "not set".
    pub fn voice_id(&self) -> Option<&str> {
        non_empty(&self.voice_id)
    }

    pub fn auth_token(&self) -> Option<&str> {
        non_empty(&self.auth_token)
    }

    pub fn fallback_voice(&self) -> Option<&str> {
        non_empty(&self.fallback_voice)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
