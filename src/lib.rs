pub mod backends;
pub mod cache;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod lesson;
pub mod narrator;
pub mod playback;
pub mod prefetch;
pub mod service;
pub mod store;

pub use error::SpeechError;
pub use narrator::{Narrator, NarratorConfig};
pub use playback::{Completion, SpeakOptions, Utterance};
