//! SSILD routine: fixed rounds of short sense-shifting cycles followed by the
//! same number of long cycles. Uses builtin resources only.

use super::{Cue, ResourceRef, RoutineKind, RoutineMeta, RoutineParams, RoutineSpec};
use crate::library::FileSelector;
use rand::RngCore;

const SHORT_DELAY_SECS: u32 = 20;
const LONG_DELAY_SECS: u32 = 45;

#[derive(Debug, Clone)]
pub struct SsildRoutine {
    meta: RoutineMeta,
}

impl SsildRoutine {
    pub fn new(params: &RoutineParams) -> Self {
        Self {
            meta: RoutineMeta::from_params(params, RoutineKind::Ssild.to_string()),
        }
    }

    /// Rounds per phase: two always, a third when repetition > 2 and a
    /// fourth when repetition > 3.
    pub fn rounds(&self) -> u32 {
        let repetition = self.meta.play_count;
        2 + u32::from(repetition > 2) + u32::from(repetition > 3)
    }

    fn phase(&self, name: &str, delay_secs: u32) -> impl Iterator<Item = Cue> + '_ {
        let name = name.to_string();
        (1..=self.rounds()).map(move |round| {
            Cue::new(
                ResourceRef::builtin(format!("ssild_{}_{}", name, round)),
                delay_secs,
            )
        })
    }
}

impl RoutineSpec for SsildRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Ssild
    }

    fn meta(&self) -> &RoutineMeta {
        &self.meta
    }

    fn cue_sequence(&self, _library: &dyn FileSelector, _rng: &mut dyn RngCore) -> Vec<Cue> {
        self.phase("short", SHORT_DELAY_SECS)
            .chain(self.phase("long", LONG_DELAY_SECS))
            .collect()
    }
}
