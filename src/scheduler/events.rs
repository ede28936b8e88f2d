//! Playback notifications and request types.

use crate::routines::{ResourceRef, RoutineKind};

/// Status side channel published by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Label of what is playing now
    StatusChanged(String),
    StatusCleared,
    RoutineStarted { kind: RoutineKind, label: String },
    RoutineFinished { kind: RoutineKind },
    CueStarted { index: usize, resource: ResourceRef },
    /// The cue's file could not be resolved; its post-delay still runs
    CueSkipped { index: usize, resource: ResourceRef },
    LoadFailed { resource: ResourceRef, message: String },
    SequenceFinished,
}

/// Result of asking the scheduler to play routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A new foreground sequence is running
    Started,
    /// A sequence was already running; the request was dropped
    AlreadyRunning,
    /// No tag resolved to a routine
    NothingToPlay,
}

/// A request to play one or more routines back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub tags: Vec<String>,
    /// Bed to leave playing after the last routine
    pub end_background: Option<ResourceRef>,
    /// Status label kept once the sequence ends; `None` clears the status
    pub end_background_label: Option<String>,
    pub event_label: String,
    pub play_count: u32,
    pub prompt_count: u32,
}

impl PlayRequest {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            end_background: None,
            end_background_label: None,
            event_label: String::new(),
            play_count: 1,
            prompt_count: 1,
        }
    }

    pub fn with_event_label(mut self, label: impl Into<String>) -> Self {
        self.event_label = label.into();
        self
    }

    pub fn with_play_count(mut self, play_count: u32) -> Self {
        self.play_count = play_count;
        self
    }

    pub fn with_prompt_count(mut self, prompt_count: u32) -> Self {
        self.prompt_count = prompt_count;
        self
    }

    pub fn with_end_background(mut self, resource: ResourceRef, label: impl Into<String>) -> Self {
        self.end_background = Some(resource);
        self.end_background_label = Some(label.into());
        self
    }
}
