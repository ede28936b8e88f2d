//! Somnus - Layered Soundscapes for Sleep Training
//!
//! Drives a continuous background noise bed, a rotating ambience loop and a
//! sequenced foreground of routine cues (spoken prompts, clips, tones), all
//! mixed concurrently with coordinated fades and ducking.

pub mod audio;
pub mod library;
pub mod routines;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use library::{FileSelector, MediaLibrary};
pub use routines::{Cue, ResourceRef, Routine, RoutineKind, RoutineSpec};
pub use scheduler::{EngineSettings, PlayOutcome, PlayRequest, PlaybackEvent, SoundPoolManager};
pub use storage::config::AppConfig;
