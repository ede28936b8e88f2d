//! Routine Specifications
//!
//! A routine turns a routine-type tag plus the current background noise into
//! an ordered cue sequence and the layer metadata the scheduler needs to mix
//! it (labels, nominal volumes, duck behaviour, speech trigger point).

pub mod cue;
pub mod mild;
pub mod pod;
pub mod prompt;
pub mod ssild;
pub mod theme;
pub mod wild;

use crate::library::FileSelector;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use cue::{Cue, ResourceRef};
pub use mild::MildRoutine;
pub use pod::PodRoutine;
pub use prompt::{PromptFlavor, PromptRoutine};
pub use ssild::SsildRoutine;
pub use theme::{AmbientBackground, NoiseType, VolumeProfile, VolumeTable};
pub use wild::WildRoutine;

/// Errors raised while resolving routines
#[derive(Debug, Error, PartialEq)]
pub enum RoutineError {
    #[error("Unknown routine type: {0}")]
    UnknownKind(String),

    #[error("Empty routine type tag")]
    EmptyTag,
}

/// Routine type tags accepted by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineKind {
    Wild,
    Mild,
    WildPrompt,
    MildPrompt,
    Ssild,
    Pod,
}

impl RoutineKind {
    /// Canonical tag string.
    pub fn tag(&self) -> &'static str {
        match self {
            RoutineKind::Wild => "wild",
            RoutineKind::Mild => "mild",
            RoutineKind::WildPrompt => "wild_prompt",
            RoutineKind::MildPrompt => "mild_prompt",
            RoutineKind::Ssild => "ssild",
            RoutineKind::Pod => "pod",
        }
    }
}

impl std::fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutineKind::Wild => write!(f, "WILD"),
            RoutineKind::Mild => write!(f, "MILD"),
            RoutineKind::WildPrompt => write!(f, "WILD prompt"),
            RoutineKind::MildPrompt => write!(f, "MILD prompt"),
            RoutineKind::Ssild => write!(f, "SSILD"),
            RoutineKind::Pod => write!(f, "Podcast"),
        }
    }
}

impl FromStr for RoutineKind {
    type Err = RoutineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase().replace('-', "_");
        match tag.as_str() {
            "" => Err(RoutineError::EmptyTag),
            "wild" => Ok(RoutineKind::Wild),
            "mild" => Ok(RoutineKind::Mild),
            "wild_prompt" | "prompt" => Ok(RoutineKind::WildPrompt),
            "mild_prompt" => Ok(RoutineKind::MildPrompt),
            "ssild" => Ok(RoutineKind::Ssild),
            "pod" | "podcast" => Ok(RoutineKind::Pod),
            _ => Err(RoutineError::UnknownKind(s.to_string())),
        }
    }
}

/// How the background is lowered before a routine's cues start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuckProfile {
    /// Number of envelope steps
    pub steps: u32,
    /// Delay between steps
    pub step_delay: Duration,
    /// Target as a fraction of the nominal background volume
    pub factor: f32,
}

impl DuckProfile {
    pub const STANDARD: DuckProfile = DuckProfile {
        steps: 20,
        step_delay: Duration::from_millis(150),
        factor: 0.35,
    };

    /// Faster and shallower, for one-minute prompts.
    pub const QUICK: DuckProfile = DuckProfile {
        steps: 10,
        step_delay: Duration::from_millis(100),
        factor: 0.55,
    };

    /// Deeper and slower, for long spoken content.
    pub const DEEP: DuckProfile = DuckProfile {
        steps: 40,
        step_delay: Duration::from_millis(250),
        factor: 0.15,
    };

    /// Background target for a given nominal volume.
    pub fn target(&self, nominal: f32) -> f32 {
        (nominal * self.factor).clamp(0.0, 1.0)
    }
}

/// What happens on the background layers once the settle delay has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStartup {
    /// Jump the background back to nominal volume
    ResumeBackground,
    /// Slowly ramp the background back up while the first cues play
    FadeUpBackground,
    /// Start the alternate-background ambience loop with its startup cues
    AlternateLoop,
    /// Keep the background ducked until the duck time limit elapses
    HoldDuck,
}

/// How the background comes back after a per-cue duck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePolicy {
    /// Set nominal volume at once
    Immediate,
    /// Slow fade-up, with the ambience loop restarted (no startup cues)
    SlowFade,
}

/// Fields shared by every routine variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineMeta {
    /// Play count / repetition, at least 1
    pub play_count: u32,
    pub noise: NoiseType,
    pub background: ResourceRef,
    pub end_background: ResourceRef,
    pub background_volume: f32,
    pub alternate_background_volume: f32,
    pub foreground_volume: f32,
    pub event_label: String,
    pub background_label: String,
    pub end_background_label: Option<String>,
    pub foreground_label: String,
}

impl RoutineMeta {
    /// Build metadata from request parameters.
    pub fn from_params(params: &RoutineParams, foreground_label: impl Into<String>) -> Self {
        let volumes = params.volumes.clamped();
        Self {
            play_count: params.play_count.max(1),
            noise: params.ambient.noise,
            background: params.ambient.resource.clone(),
            end_background: params
                .end_background
                .clone()
                .unwrap_or_else(|| params.ambient.resource.clone()),
            background_volume: volumes.background,
            alternate_background_volume: volumes.alternate_background,
            foreground_volume: volumes.foreground,
            event_label: params.event_label.clone(),
            background_label: params.ambient.label.clone(),
            end_background_label: params.end_background_label.clone(),
            foreground_label: foreground_label.into(),
        }
    }

    /// Nominal volumes as a profile.
    pub fn volumes(&self) -> VolumeProfile {
        VolumeProfile::new(
            self.background_volume,
            self.alternate_background_volume,
            self.foreground_volume,
        )
    }
}

/// Inputs for constructing a routine.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineParams {
    pub ambient: AmbientBackground,
    pub volumes: VolumeProfile,
    pub end_background: Option<ResourceRef>,
    pub end_background_label: Option<String>,
    pub event_label: String,
    pub play_count: u32,
    pub prompt_count: u32,
}

impl RoutineParams {
    /// Parameters with the volumes looked up for the ambient noise type.
    pub fn new(ambient: AmbientBackground, table: &VolumeTable) -> Self {
        let volumes = table.profile(ambient.noise);
        Self {
            ambient,
            volumes,
            end_background: None,
            end_background_label: None,
            event_label: String::new(),
            play_count: 1,
            prompt_count: 1,
        }
    }
}

/// Capability set shared by all routine variants.
pub trait RoutineSpec: Send + Sync {
    /// Variant tag
    fn kind(&self) -> RoutineKind;

    fn meta(&self) -> &RoutineMeta;

    /// Ordered cue sequence. Draws from the rotation pool and marks the
    /// drawn files used; deterministic for a given random source.
    fn cue_sequence(&self, library: &dyn FileSelector, rng: &mut dyn RngCore) -> Vec<Cue>;

    /// Played once, on the first pass of the ambience loop.
    fn startup_cues(&self, _library: &dyn FileSelector) -> Vec<ResourceRef> {
        Vec::new()
    }

    /// Ambience loop content, replayed until the layer stops.
    fn alternate_background_cues(&self, _library: &dyn FileSelector) -> Vec<ResourceRef> {
        Vec::new()
    }

    /// Whether the background must be ducked before the cues begin.
    fn overrides_background(&self) -> bool {
        let meta = self.meta();
        meta.background != meta.end_background
    }

    /// Longest time the background may stay ducked. `None` is unlimited.
    fn duck_time_limit(&self) -> Option<Duration> {
        None
    }

    /// Cue index after which spoken announcements are scheduled.
    fn speech_trigger_cue_index(&self) -> Option<usize> {
        None
    }

    fn speech_event_count(&self) -> u32 {
        0
    }

    fn speech_event_interval_minutes(&self) -> u32 {
        0
    }

    fn duck_profile(&self) -> DuckProfile {
        DuckProfile::STANDARD
    }

    /// Settle delays waited between the duck and the first cue.
    fn settle_iterations(&self) -> u32 {
        1
    }

    fn layer_startup(&self) -> LayerStartup {
        LayerStartup::ResumeBackground
    }

    fn restore_policy(&self) -> RestorePolicy {
        RestorePolicy::Immediate
    }
}

/// A concrete routine.
#[derive(Debug, Clone)]
pub enum Routine {
    Wild(WildRoutine),
    Mild(MildRoutine),
    Prompt(PromptRoutine),
    Ssild(SsildRoutine),
    Pod(PodRoutine),
}

impl Routine {
    /// Build the routine for a tag.
    pub fn build(kind: RoutineKind, params: &RoutineParams) -> Self {
        match kind {
            RoutineKind::Wild => Routine::Wild(WildRoutine::new(params)),
            RoutineKind::Mild => Routine::Mild(MildRoutine::new(params)),
            RoutineKind::WildPrompt => {
                Routine::Prompt(PromptRoutine::new(params, PromptFlavor::Wild))
            }
            RoutineKind::MildPrompt => {
                Routine::Prompt(PromptRoutine::new(params, PromptFlavor::Mild))
            }
            RoutineKind::Ssild => Routine::Ssild(SsildRoutine::new(params)),
            RoutineKind::Pod => Routine::Pod(PodRoutine::new(params)),
        }
    }

    /// Parse a tag and build the routine.
    pub fn from_tag(tag: &str, params: &RoutineParams) -> Result<Self, RoutineError> {
        let kind = tag.parse::<RoutineKind>()?;
        Ok(Self::build(kind, params))
    }

    pub fn spec(&self) -> &dyn RoutineSpec {
        match self {
            Routine::Wild(r) => r,
            Routine::Mild(r) => r,
            Routine::Prompt(r) => r,
            Routine::Ssild(r) => r,
            Routine::Pod(r) => r,
        }
    }
}

/// Draw `count` clips from the rotation pool of `dir` and mark them used.
///
/// A pool smaller than `count` is cycled (reshuffled each round) to fill the
/// count; an empty pool yields nothing.
pub(crate) fn draw_clips(
    library: &dyn FileSelector,
    dir: &str,
    count: usize,
    rng: &mut dyn RngCore,
) -> Vec<String> {
    let mut pool = library.unused_files(dir, count);
    if pool.is_empty() {
        tracing::warn!("No clips available in {}", dir);
        return Vec::new();
    }

    pool.shuffle(&mut *rng);
    let mut drawn: Vec<String> = pool.iter().take(count).cloned().collect();

    while drawn.len() < count {
        pool.shuffle(&mut *rng);
        let missing = count - drawn.len();
        drawn.extend(pool.iter().take(missing).cloned());
    }

    library.mark_used(dir, &drawn);
    drawn
}

/// First number embedded in a file name, e.g. `episode_07.mp3` -> 7.
pub(crate) fn first_number(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
