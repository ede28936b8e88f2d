//! Playback Scheduler
//!
//! Mixes three layers concurrently: a looping background bed, a rotating
//! alternate-background ambience loop and the foreground cue sequence of one
//! or more routines. Each layer is driven by its own tokio task and owns a
//! stop token; volume changes go through the envelope with one writer per
//! layer at a time.

pub mod channel;
pub mod events;
pub mod manager;
pub mod volume;

use crate::audio::FadeSpec;
use crate::routines::VolumeTable;
use std::time::Duration;

pub use channel::{ChannelState, Layer};
pub use events::{PlayOutcome, PlayRequest, PlaybackEvent};
pub use manager::SoundPoolManager;
pub use volume::{plan_cue, CueAdjustment, VolumeState};

/// Timing and mixing parameters of the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Background level during a per-cue duck, as a fraction of nominal
    pub duck_factor: f32,
    /// Wait between the routine duck and the first cue
    pub settle_delay: Duration,
    /// Hold after a per-cue duck before the cue plays
    pub cue_duck_hold: Duration,
    pub load_poll_retries: u32,
    pub load_poll_interval: Duration,
    pub play_poll_interval: Duration,
    /// Slow ramp back to nominal after a duck or an interruption
    pub restore_fade: FadeSpec,
    /// Ramp used by per-cue ducks
    pub cue_duck: FadeSpec,
    pub volumes: VolumeTable,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            duck_factor: 0.35,
            settle_delay: Duration::from_millis(1000),
            cue_duck_hold: Duration::from_millis(1500),
            load_poll_retries: 20,
            load_poll_interval: Duration::from_millis(100),
            play_poll_interval: Duration::from_millis(250),
            restore_fade: FadeSpec::new(40, Duration::from_millis(500)),
            cue_duck: FadeSpec::new(5, Duration::from_millis(100)),
            volumes: VolumeTable::default(),
        }
    }
}
