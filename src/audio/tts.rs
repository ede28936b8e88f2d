//! Text-to-Speech Synthesis
//!
//! Speech output for announcements. `LogSynth` only traces what would be
//! spoken; `TtsSynth` uses the platform engine through the tts crate.

use super::AudioError;
use parking_lot::Mutex;

/// Trait for speech synthesizers
pub trait SpeechSynth: Send + Sync {
    /// Set speech rate (0.5 - 2.0, where 1.0 is normal)
    fn set_rate(&self, rate: f32);

    /// Get current speech rate
    fn rate(&self) -> f32;

    /// Set volume (0.0 - 1.0)
    fn set_volume(&self, volume: f32);

    /// Get current volume
    fn volume(&self) -> f32;

    /// Queue text for speaking. Returns without waiting for the speech to end.
    fn speak(&self, text: &str) -> Result<(), AudioError>;

    /// Stop current speech
    fn stop(&self);
}

/// Synthesizer that only logs.
pub struct LogSynth {
    rate: Mutex<f32>,
    volume: Mutex<f32>,
    spoken: Mutex<Vec<String>>,
}

impl Default for LogSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSynth {
    pub fn new() -> Self {
        Self {
            rate: Mutex::new(1.0),
            volume: Mutex::new(1.0),
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Everything spoken so far.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

impl SpeechSynth for LogSynth {
    fn set_rate(&self, rate: f32) {
        *self.rate.lock() = rate.clamp(0.5, 2.0);
    }

    fn rate(&self) -> f32 {
        *self.rate.lock()
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn speak(&self, text: &str) -> Result<(), AudioError> {
        if text.is_empty() {
            return Ok(());
        }
        tracing::info!("Speaking: {}", text);
        self.spoken.lock().push(text.to_string());
        Ok(())
    }

    fn stop(&self) {
        tracing::debug!("Speech stopped");
    }
}

/// Platform text-to-speech through the tts crate.
#[cfg(feature = "speech")]
pub struct TtsSynth {
    tts: Mutex<tts::Tts>,
    rate: Mutex<f32>,
    volume: Mutex<f32>,
}

#[cfg(feature = "speech")]
impl TtsSynth {
    /// Initialize the platform TTS engine.
    pub fn new() -> Result<Self, AudioError> {
        tracing::info!("Initializing TTS engine");
        let tts = tts::Tts::default().map_err(|e| AudioError::TtsInitFailed(e.to_string()))?;
        Ok(Self {
            tts: Mutex::new(tts),
            rate: Mutex::new(1.0),
            volume: Mutex::new(1.0),
        })
    }
}

#[cfg(feature = "speech")]
impl SpeechSynth for TtsSynth {
    fn set_rate(&self, rate: f32) {
        let rate = rate.clamp(0.5, 2.0);
        *self.rate.lock() = rate;
        let mut tts = self.tts.lock();
        let normal = tts.normal_rate();
        if let Err(e) = tts.set_rate(normal * rate) {
            tracing::warn!("Failed to set speech rate: {}", e);
        }
    }

    fn rate(&self) -> f32 {
        *self.rate.lock()
    }

    fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        *self.volume.lock() = volume;
        let mut tts = self.tts.lock();
        let max = tts.max_volume();
        if let Err(e) = tts.set_volume(max * volume) {
            tracing::warn!("Failed to set speech volume: {}", e);
        }
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn speak(&self, text: &str) -> Result<(), AudioError> {
        if text.is_empty() {
            return Ok(());
        }
        tracing::debug!("TTS speaking: {}", text);
        self.tts
            .lock()
            .speak(text, false)
            .map(|_| ())
            .map_err(|e| AudioError::PlaybackFailed(e.to_string()))
    }

    fn stop(&self) {
        if let Err(e) = self.tts.lock().stop() {
            tracing::warn!("Failed to stop speech: {}", e);
        }
    }
}

/// Utility functions for spoken text
pub mod text_utils {
    /// Convert number to spoken form
    pub fn number_to_words(n: u32) -> String {
        match n {
            0 => "zero".to_string(),
            1 => "one".to_string(),
            2 => "two".to_string(),
            3 => "three".to_string(),
            4 => "four".to_string(),
            5 => "five".to_string(),
            6 => "six".to_string(),
            7 => "seven".to_string(),
            8 => "eight".to_string(),
            9 => "nine".to_string(),
            10 => "ten".to_string(),
            11 => "eleven".to_string(),
            12 => "twelve".to_string(),
            _ => n.to_string(),
        }
    }

    /// Spoken reminder for the `index`-th of `count` announcements.
    pub fn reminder(index: u32, count: u32) -> String {
        format!(
            "Reminder {} of {}. Are you dreaming?",
            number_to_words(index),
            number_to_words(count)
        )
    }

    /// Format a minute count for speech
    pub fn format_minutes(minutes: u32) -> String {
        match minutes {
            1 => "one minute".to_string(),
            m if m < 60 => format!("{} minutes", number_to_words(m)),
            m if m % 60 == 0 => format!("{} hours", m / 60),
            m => format!("{} hours and {} minutes", m / 60, m % 60),
        }
    }
}
