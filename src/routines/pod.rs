//! Podcast routine: one spoken episode per invocation.
//!
//! The episode number is the play count. Callers advance it between
//! invocations; the routine keeps no history of its own.

use super::{
    first_number, Cue, DuckProfile, LayerStartup, ResourceRef, RoutineKind, RoutineMeta,
    RoutineParams, RoutineSpec,
};
use crate::library::FileSelector;
use rand::RngCore;
use std::time::Duration;

pub const EPISODES_DIR: &str = "pod";

const DUCK_TIME_LIMIT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct PodRoutine {
    meta: RoutineMeta,
}

impl PodRoutine {
    pub fn new(params: &RoutineParams) -> Self {
        let episode = params.play_count.max(1);
        Self {
            meta: RoutineMeta::from_params(
                params,
                format!("{} episode {}", RoutineKind::Pod, episode),
            ),
        }
    }

    pub fn episode(&self) -> u32 {
        self.meta.play_count
    }

    /// File for the current episode.
    ///
    /// Prefers a file whose name carries the episode number; otherwise the
    /// episode index wraps over the sorted listing.
    fn episode_file(&self, library: &dyn FileSelector) -> String {
        let episode = self.episode();
        let files = library.list_files(EPISODES_DIR);

        if let Some(file) = files.iter().find(|f| first_number(f) == Some(episode)) {
            return file.clone();
        }

        if files.is_empty() {
            tracing::warn!("No podcast episodes in {}", EPISODES_DIR);
            return format!("episode_{}.mp3", episode);
        }

        let index = episode.saturating_sub(1) as usize % files.len();
        files[index].clone()
    }
}

impl RoutineSpec for PodRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Pod
    }

    fn meta(&self) -> &RoutineMeta {
        &self.meta
    }

    fn cue_sequence(&self, library: &dyn FileSelector, _rng: &mut dyn RngCore) -> Vec<Cue> {
        vec![Cue::new(
            ResourceRef::file(EPISODES_DIR, self.episode_file(library)),
            0,
        )]
    }

    fn overrides_background(&self) -> bool {
        true
    }

    fn duck_time_limit(&self) -> Option<Duration> {
        Some(DUCK_TIME_LIMIT)
    }

    fn duck_profile(&self) -> DuckProfile {
        DuckProfile::DEEP
    }

    fn layer_startup(&self) -> LayerStartup {
        LayerStartup::HoldDuck
    }
}
