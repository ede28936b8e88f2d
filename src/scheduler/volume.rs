//! Shared volume state and the per-cue adjustment rules.

use crate::audio::clamp_volume;
use crate::routines::{Cue, VolumeProfile};

/// Tolerance when comparing the background against its nominal level.
const NOMINAL_EPSILON: f32 = 1e-3;

/// Current mix levels. Written by one fade or the sequencer at a time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeState {
    pub background: f32,
    pub alternate_background: f32,
    pub alternate_background_ceiling: f32,
    pub foreground: f32,
    /// A cue ducked the background and nobody restored it yet
    pub ducked_for_cue: bool,
}

impl VolumeState {
    /// Reset the foreground and ambience levels for a new routine.
    pub fn begin_routine(&mut self, nominal: &VolumeProfile) {
        self.foreground = nominal.foreground;
        self.alternate_background = nominal.alternate_background;
        self.alternate_background_ceiling = nominal.alternate_background;
        self.ducked_for_cue = false;
    }

    /// Whether the background sits at its nominal, non-ducked level.
    pub fn background_at(&self, nominal: f32) -> bool {
        (self.background - nominal).abs() < NOMINAL_EPSILON
    }
}

/// Mix change requested before a cue plays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CueAdjustment {
    /// Scale the cue and the ambience ceiling; background untouched
    Scale {
        foreground: f32,
        alternate_ceiling: f32,
    },
    /// Duck the background for this cue and stop the ambience loop
    Duck { background: f32 },
    /// Undo a duck left behind by an earlier cue
    Restore { foreground: f32, background: f32 },
    /// Play at the current levels
    Keep,
}

/// Decide how the mix changes for `cue`.
///
/// A non-zero multiplier wins over a duck request; a duck only applies while
/// the background is at nominal; a pending duck is restored by the next cue
/// that asks for neither.
pub fn plan_cue(
    cue: &Cue,
    state: &VolumeState,
    nominal: &VolumeProfile,
    duck_factor: f32,
) -> CueAdjustment {
    if let Some(multiplier) = cue.effective_multiplier() {
        return CueAdjustment::Scale {
            foreground: clamp_volume(nominal.foreground * multiplier),
            alternate_ceiling: clamp_volume(nominal.alternate_background * multiplier),
        };
    }

    if cue.duck_override && state.background_at(nominal.background) {
        return CueAdjustment::Duck {
            background: clamp_volume(nominal.background * duck_factor),
        };
    }

    if state.ducked_for_cue {
        return CueAdjustment::Restore {
            foreground: nominal.foreground,
            background: nominal.background,
        };
    }

    CueAdjustment::Keep
}
