//! MILD routine: intro, finish and start cues followed by rotating
//! foreground clips. Repeat plays get a prompt cue part way through.

use super::{
    draw_clips, Cue, LayerStartup, ResourceRef, RestorePolicy, RoutineKind, RoutineMeta,
    RoutineParams, RoutineSpec,
};
use crate::library::FileSelector;
use rand::RngCore;

pub const CLIPS_DIR: &str = "mild/clips";

const INTRO_ID: &str = "mild_intro";
const FINISH_ID: &str = "mild_finish";
const START_ID: &str = "mild_start";
const PROMPT_ID: &str = "mild_prompt";
const FRAME_DELAY_SECS: u32 = 5;
const CLIP_DELAY_SECS: u32 = 40;
const PROMPT_DELAY_SECS: u32 = 10;
const PROMPT_INDEX: usize = 5;
const FIRST_PLAY_CLIP_LIMIT: usize = 6;
const REPEAT_PLAY_CLIP_LIMIT: usize = 9;

#[derive(Debug, Clone)]
pub struct MildRoutine {
    meta: RoutineMeta,
}

impl MildRoutine {
    pub fn new(params: &RoutineParams) -> Self {
        Self {
            meta: RoutineMeta::from_params(params, RoutineKind::Mild.to_string()),
        }
    }

    fn clip_limit(&self) -> usize {
        if self.meta.play_count == 1 {
            FIRST_PLAY_CLIP_LIMIT
        } else {
            REPEAT_PLAY_CLIP_LIMIT
        }
    }
}

impl RoutineSpec for MildRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Mild
    }

    fn meta(&self) -> &RoutineMeta {
        &self.meta
    }

    fn cue_sequence(&self, library: &dyn FileSelector, rng: &mut dyn RngCore) -> Vec<Cue> {
        let mut cues = vec![
            Cue::new(ResourceRef::builtin(INTRO_ID), FRAME_DELAY_SECS),
            Cue::new(ResourceRef::builtin(FINISH_ID), FRAME_DELAY_SECS),
            Cue::new(ResourceRef::builtin(START_ID), FRAME_DELAY_SECS),
        ];

        cues.extend(
            draw_clips(library, CLIPS_DIR, self.clip_limit(), rng)
                .into_iter()
                .map(|name| Cue::new(ResourceRef::file(CLIPS_DIR, name), CLIP_DELAY_SECS)),
        );

        if self.meta.play_count > 1 {
            let prompt =
                Cue::new(ResourceRef::builtin(PROMPT_ID), PROMPT_DELAY_SECS).with_duck();
            cues.insert(PROMPT_INDEX.min(cues.len()), prompt);
        }

        cues
    }

    fn layer_startup(&self) -> LayerStartup {
        LayerStartup::FadeUpBackground
    }

    fn restore_policy(&self) -> RestorePolicy {
        RestorePolicy::SlowFade
    }
}
