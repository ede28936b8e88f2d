//! Audio Primitives
//!
//! Channel-level playback backends, the volume envelope used for fades and
//! ducking, and the speech announcer.

pub mod announcer;
pub mod backend;
pub mod envelope;
#[cfg(feature = "playback")]
pub mod rodio_backend;
pub mod tts;

use thiserror::Error;

// Re-export main types
pub use announcer::{Announcer, ScheduledAnnouncer};
pub use backend::{AudioBackend, BackendOp, ChannelHandle, LoadState, SimulatedBackend};
pub use envelope::{fade, step_volume, FadeSpec};
#[cfg(feature = "playback")]
pub use rodio_backend::RodioBackend;
pub use tts::{LogSynth, SpeechSynth};
#[cfg(feature = "speech")]
pub use tts::TtsSynth;

/// Errors that can occur during audio operations
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("TTS initialization failed: {0}")]
    TtsInitFailed(String),

    #[error("Sound file not found: {0}")]
    SoundNotFound(String),

    #[error("Failed to load sound: {0}")]
    LoadFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Unknown channel handle: {0}")]
    UnknownHandle(ChannelHandle),
}

/// Clamp a volume to the valid [0, 1] range. NaN becomes silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
