//! Cues and resource references.
//!
//! A cue is the atomic playback unit of a routine: what to play, how long to
//! wait afterwards and how it wants the mix adjusted while it plays.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Reference to a playable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRef {
    /// Fixed resource shipped with the application, looked up by id
    Builtin(String),
    /// File inside a media library directory
    File { dir: String, name: String },
    /// Absolute path on disk
    Path(PathBuf),
}

impl ResourceRef {
    /// Create a builtin resource reference.
    pub fn builtin(id: impl Into<String>) -> Self {
        ResourceRef::Builtin(id.into())
    }

    /// Create a library file reference.
    pub fn file(dir: impl Into<String>, name: impl Into<String>) -> Self {
        ResourceRef::File {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Short human readable name, used for status labels and logs.
    pub fn display_name(&self) -> String {
        match self {
            ResourceRef::Builtin(id) => id.clone(),
            ResourceRef::File { name, .. } => name.clone(),
            ResourceRef::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Builtin(id) => write!(f, "builtin:{}", id),
            ResourceRef::File { dir, name } => write!(f, "{}/{}", dir, name),
            ResourceRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One playable unit within a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// What to play
    pub resource: ResourceRef,
    /// Silence after the cue finishes, in seconds
    pub post_delay_secs: u32,
    /// Duck the background while this cue plays
    pub duck_override: bool,
    /// Explicit foreground multiplier; wins over `duck_override`
    pub volume_multiplier: Option<f32>,
}

impl Cue {
    /// Create a plain cue.
    pub fn new(resource: ResourceRef, post_delay_secs: u32) -> Self {
        Self {
            resource,
            post_delay_secs,
            duck_override: false,
            volume_multiplier: None,
        }
    }

    /// Request a background duck for this cue.
    pub fn with_duck(mut self) -> Self {
        self.duck_override = true;
        self
    }

    /// Set an explicit volume multiplier.
    pub fn with_volume_multiplier(mut self, multiplier: f32) -> Self {
        self.volume_multiplier = Some(multiplier);
        self
    }

    /// Multiplier that actually applies. Zero counts as unset.
    pub fn effective_multiplier(&self) -> Option<f32> {
        self.volume_multiplier.filter(|m| *m != 0.0)
    }
}
