//! Prompt routines: deliberately short (about a minute) reminders used to
//! re-enter a WILD or MILD practice during the night.

use super::{
    Cue, DuckProfile, LayerStartup, ResourceRef, RoutineKind, RoutineMeta, RoutineParams,
    RoutineSpec,
};
use crate::library::{file_stem, FileSelector};
use rand::seq::SliceRandom;
use rand::RngCore;

const RANDOM_PREFIX: &str = "random_";
const FOREGROUND_PREFIX: &str = "foreground";
const FOREGROUND_FALLBACK: &str = "foreground.mp3";
const RANDOM_VOLUME_MULTIPLIER: f32 = 1.1;
const SILENCE_GAP_SECS: u32 = 30;
const SPEECH_EVENT_COUNT: u32 = 2;
const SPEECH_EVENT_INTERVAL_MINUTES: u32 = 10;

/// Which practice the prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFlavor {
    Wild,
    Mild,
}

impl PromptFlavor {
    /// Library directory holding this flavour's clips.
    pub fn dir(&self) -> &'static str {
        match self {
            PromptFlavor::Wild => "prompts/wild",
            PromptFlavor::Mild => "prompts/mild",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptRoutine {
    meta: RoutineMeta,
    flavor: PromptFlavor,
    prompt_count: u32,
}

impl PromptRoutine {
    pub fn new(params: &RoutineParams, flavor: PromptFlavor) -> Self {
        let kind = match flavor {
            PromptFlavor::Wild => RoutineKind::WildPrompt,
            PromptFlavor::Mild => RoutineKind::MildPrompt,
        };
        Self {
            meta: RoutineMeta::from_params(params, kind.to_string()),
            flavor,
            prompt_count: params.prompt_count.max(1),
        }
    }

    pub fn flavor(&self) -> PromptFlavor {
        self.flavor
    }

    /// Position of this prompt within a chained sequence, starting at 1.
    pub fn prompt_count(&self) -> u32 {
        self.prompt_count
    }

    fn is_first(&self) -> bool {
        self.prompt_count == 1
    }
}

impl RoutineSpec for PromptRoutine {
    fn kind(&self) -> RoutineKind {
        match self.flavor {
            PromptFlavor::Wild => RoutineKind::WildPrompt,
            PromptFlavor::Mild => RoutineKind::MildPrompt,
        }
    }

    fn meta(&self) -> &RoutineMeta {
        &self.meta
    }

    fn cue_sequence(&self, library: &dyn FileSelector, rng: &mut dyn RngCore) -> Vec<Cue> {
        let dir = self.flavor.dir();
        let files = library.list_files(dir);
        let mut cues = Vec::with_capacity(2);

        if self.is_first() {
            let randoms: Vec<&String> = files
                .iter()
                .filter(|f| f.starts_with(RANDOM_PREFIX))
                .collect();
            match randoms.choose(&mut *rng) {
                Some(name) => cues.push(
                    Cue::new(ResourceRef::file(dir, name.as_str()), SILENCE_GAP_SECS)
                        .with_volume_multiplier(RANDOM_VOLUME_MULTIPLIER),
                ),
                None => tracing::warn!("No random prompt clips in {}", dir),
            }
        }

        let foreground = files
            .iter()
            .find(|f| file_stem(f).starts_with(FOREGROUND_PREFIX))
            .cloned()
            .unwrap_or_else(|| FOREGROUND_FALLBACK.to_string());
        cues.push(Cue::new(ResourceRef::file(dir, foreground), 0));

        cues
    }

    fn overrides_background(&self) -> bool {
        true
    }

    fn speech_trigger_cue_index(&self) -> Option<usize> {
        self.is_first().then_some(0)
    }

    fn speech_event_count(&self) -> u32 {
        SPEECH_EVENT_COUNT
    }

    fn speech_event_interval_minutes(&self) -> u32 {
        SPEECH_EVENT_INTERVAL_MINUTES
    }

    fn duck_profile(&self) -> DuckProfile {
        DuckProfile::QUICK
    }

    fn settle_iterations(&self) -> u32 {
        2
    }

    fn layer_startup(&self) -> LayerStartup {
        LayerStartup::FadeUpBackground
    }
}
