use crate::error::SpeechError;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

/// How often the audio thread checks whether the current sink drained.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipId(u64);

/// Decoded-on-demand audio for one narration text.
#[derive(Debug)]
pub struct AudioClip {
    id: ClipId,
    text: String,
    bytes: Vec<u8>,
}

/// Opaque, shared reference to an [`AudioClip`].
///
/// The cache owns one reference; a playing sink holds another. The clip's
/// buffer is freed when the last reference goes away, so evicting a clip
/// that is still playing defers the release until playback ends.
#[derive(Debug, Clone)]
pub struct AudioHandle(Arc<AudioClip>);

impl AudioHandle {
    pub fn new(text: impl Into<String>, bytes: Vec<u8>) -> Self {
        let id = ClipId(NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed));
        Self(Arc::new(AudioClip {
            id,
            text: text.into(),
            bytes,
        }))
    }

    pub fn id(&self) -> ClipId {
        self.0.id
    }

    pub fn text(&self) -> &str {
        &self.0.text
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// A weak reference, upgradeable only while someone still holds the clip.
    pub fn downgrade(&self) -> Weak<AudioClip> {
        Arc::downgrade(&self.0)
    }
}

impl AsRef<[u8]> for AudioHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0.bytes
    }
}

/// Terminal event of one playback, sent at most once.
///
/// Stopping a playback sends nothing: the receiver just sees its sender
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Finished,
    Failed(SpeechError),
}

/// Something that can play one clip at a time.
pub trait AudioSink: Send + Sync {
    /// Start playing `clip`, replacing whatever was playing.
    fn play(&self, clip: AudioHandle) -> oneshot::Receiver<PlaybackEvent>;

    /// Stop the current clip without reporting an event.
    fn stop(&self);
}

enum SinkCommand {
    Play(AudioHandle, oneshot::Sender<PlaybackEvent>),
    Stop,
}

/// rodio-backed sink. The output stream must live on a single thread, so
/// all work happens on a dedicated audio thread fed by a channel.
#[derive(Clone)]
pub struct RodioSink {
    tx: Sender<SinkCommand>,
}

impl RodioSink {
    /// `volume` (0.0 - 1.0) applies to every clip.
    pub fn new(volume: f32) -> Self {
        let (tx, rx) = channel::<SinkCommand>();

        thread::spawn(move || {
            // Audio stream must live on this thread
            let (_stream, stream_handle) = match OutputStream::try_default() {
                Ok(output) => output,
                Err(e) => {
                    error!("No audio output device found: {}", e);
                    // Keep answering so callers see failures instead of hanging.
                    while let Ok(cmd) = rx.recv() {
                        if let SinkCommand::Play(_, done) = cmd {
                            let _ = done.send(PlaybackEvent::Failed(SpeechError::Device(
                                e.to_string(),
                            )));
                        }
                    }
                    return;
                }
            };
            info!("Audio thread ready");

            let mut current: Option<(Sink, AudioHandle, oneshot::Sender<PlaybackEvent>)> = None;

            loop {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(SinkCommand::Play(clip, done)) => {
                        if let Some((sink, _, _)) = current.take() {
                            sink.stop();
                        }
                        let sink = match Sink::try_new(&stream_handle) {
                            Ok(sink) => sink,
                            Err(e) => {
                                let _ = done
                                    .send(PlaybackEvent::Failed(SpeechError::Device(e.to_string())));
                                continue;
                            }
                        };
                        match Decoder::new(Cursor::new(clip.clone())) {
                            Ok(source) => {
                                sink.set_volume(volume);
                                sink.append(source);
                                debug!(clip = ?clip.id(), bytes = clip.len(), "Playing clip");
                                current = Some((sink, clip, done));
                            }
                            Err(e) => {
                                warn!(clip = ?clip.id(), "Failed to decode: {}", e);
                                let _ = done
                                    .send(PlaybackEvent::Failed(SpeechError::Decode(e.to_string())));
                            }
                        }
                    }
                    Ok(SinkCommand::Stop) => {
                        if let Some((sink, clip, _)) = current.take() {
                            sink.stop();
                            debug!(clip = ?clip.id(), "Playback stopped");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if current.as_ref().is_some_and(|(sink, _, _)| sink.empty()) {
                    if let Some((_, clip, done)) = current.take() {
                        debug!(clip = ?clip.id(), "Clip finished");
                        let _ = done.send(PlaybackEvent::Finished);
                    }
                }
            }
        });

        Self { tx }
    }
}

impl AudioSink for RodioSink {
    fn play(&self, clip: AudioHandle) -> oneshot::Receiver<PlaybackEvent> {
        let (done_tx, done_rx) = oneshot::channel();
        if let Err(e) = self.tx.send(SinkCommand::Play(clip, done_tx)) {
            // Audio thread is gone; report through the same channel.
            if let SinkCommand::Play(_, done) = e.0 {
                let _ = done.send(PlaybackEvent::Failed(SpeechError::Device(
                    "audio thread stopped".into(),
                )));
            }
        }
        done_rx
    }

    fn stop(&self) {
        let _ = self.tx.send(SinkCommand::Stop);
    }
}
