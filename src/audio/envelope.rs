//! Volume Envelope
//!
//! Linear fades over a fixed number of discrete steps. Shared by background
//! ducking, per-cue ducks and the fade-up after a duck or an interruption.

use super::clamp_volume;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Step count and per-step delay of a fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeSpec {
    pub steps: u32,
    pub step_delay: Duration,
}

impl FadeSpec {
    pub const fn new(steps: u32, step_delay: Duration) -> Self {
        Self { steps, step_delay }
    }

    /// Apply the target in one go.
    pub const fn immediate() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total time the fade takes when not cancelled.
    pub fn duration(&self) -> Duration {
        self.step_delay * self.steps
    }
}

/// Volume applied at `step` of a `steps`-step fade, clamped to [0, 1].
///
/// `steps == 0` jumps straight to `finish`.
pub fn step_volume(start: f32, finish: f32, step: u32, steps: u32) -> f32 {
    if steps == 0 || step >= steps {
        return clamp_volume(finish);
    }
    let progress = step as f32 / steps as f32;
    clamp_volume(start + (finish - start) * progress)
}

/// Run a fade from `start` to `finish`, calling `apply` with each step's
/// volume.
///
/// The cancel flag is checked before every step delay; when set, the fade
/// stops and returns the last volume it applied.
pub async fn fade<F>(spec: FadeSpec, start: f32, finish: f32, cancel: &AtomicBool, mut apply: F) -> f32
where
    F: FnMut(f32),
{
    let mut last = clamp_volume(start);

    if spec.steps == 0 {
        if cancel.load(Ordering::Acquire) {
            return last;
        }
        last = step_volume(start, finish, 0, 0);
        apply(last);
        return last;
    }

    for step in 1..=spec.steps {
        if cancel.load(Ordering::Acquire) {
            tracing::debug!("Fade cancelled at step {}/{} ({:.3})", step - 1, spec.steps, last);
            return last;
        }
        tokio::time::sleep(spec.step_delay).await;
        if cancel.load(Ordering::Acquire) {
            return last;
        }
        last = step_volume(start, finish, step, spec.steps);
        apply(last);
    }

    last
}
