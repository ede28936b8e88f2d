//! WILD routine: a run of rotating foreground clips over an ambience loop,
//! with a spoken prompt early on and a tuning cue plus main clip near the end.

use super::{
    draw_clips, Cue, LayerStartup, ResourceRef, RestorePolicy, RoutineKind, RoutineMeta,
    RoutineParams, RoutineSpec,
};
use crate::library::FileSelector;
use rand::RngCore;

pub const CLIPS_DIR: &str = "wild/clips";
pub const MAIN_DIR: &str = "wild/main";
pub const STARTUP_DIR: &str = "wild/startup";
pub const AMBIENCE_DIR: &str = "ambience";

const CLIP_COUNT: usize = 8;
const CLIP_DELAY_SECS: u32 = 20;
const PROMPT_ID: &str = "wild_prompt";
const PROMPT_INDEX: usize = 3;
const PROMPT_DELAY_SECS: u32 = 10;
const TUNING_ID: &str = "wild_tuning";
const TUNING_INDEX: usize = 6;
const TUNING_DELAY_SECS: u32 = 2;
const MAIN_DELAY_SECS: u32 = 30;
const MAIN_VOLUME_MULTIPLIER: f32 = 0.85;

#[derive(Debug, Clone)]
pub struct WildRoutine {
    meta: RoutineMeta,
}

impl WildRoutine {
    pub fn new(params: &RoutineParams) -> Self {
        Self {
            meta: RoutineMeta::from_params(params, RoutineKind::Wild.to_string()),
        }
    }

    /// Ambience directory for the current noise, falling back to the shared one.
    fn ambience_dir(&self, library: &dyn FileSelector) -> String {
        let themed = format!("{}/{}", AMBIENCE_DIR, self.meta.noise.key());
        if library.list_files(&themed).is_empty() {
            AMBIENCE_DIR.to_string()
        } else {
            themed
        }
    }
}

impl RoutineSpec for WildRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Wild
    }

    fn meta(&self) -> &RoutineMeta {
        &self.meta
    }

    fn cue_sequence(&self, library: &dyn FileSelector, rng: &mut dyn RngCore) -> Vec<Cue> {
        let mut cues: Vec<Cue> = draw_clips(library, CLIPS_DIR, CLIP_COUNT, rng)
            .into_iter()
            .map(|name| Cue::new(ResourceRef::file(CLIPS_DIR, name), CLIP_DELAY_SECS))
            .collect();

        let prompt = Cue::new(ResourceRef::builtin(PROMPT_ID), PROMPT_DELAY_SECS).with_duck();
        cues.insert(PROMPT_INDEX.min(cues.len()), prompt);

        let tuning_index = TUNING_INDEX.min(cues.len());
        cues.insert(
            tuning_index,
            Cue::new(ResourceRef::builtin(TUNING_ID), TUNING_DELAY_SECS),
        );

        if let Some(main) = draw_clips(library, MAIN_DIR, 1, rng).into_iter().next() {
            let main = Cue::new(ResourceRef::file(MAIN_DIR, main), MAIN_DELAY_SECS)
                .with_volume_multiplier(MAIN_VOLUME_MULTIPLIER);
            cues.insert(tuning_index + 1, main);
        }

        cues
    }

    fn startup_cues(&self, library: &dyn FileSelector) -> Vec<ResourceRef> {
        library
            .list_files(STARTUP_DIR)
            .into_iter()
            .map(|name| ResourceRef::file(STARTUP_DIR, name))
            .collect()
    }

    fn alternate_background_cues(&self, library: &dyn FileSelector) -> Vec<ResourceRef> {
        let dir = self.ambience_dir(library);
        library
            .list_files(&dir)
            .into_iter()
            .map(|name| ResourceRef::file(dir.clone(), name))
            .collect()
    }

    fn layer_startup(&self) -> LayerStartup {
        LayerStartup::AlternateLoop
    }

    fn restore_policy(&self) -> RestorePolicy {
        RestorePolicy::SlowFade
    }
}
