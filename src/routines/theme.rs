//! Background noise types and their volume profiles.

use super::cue::ResourceRef;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of noise playing on the background layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseType {
    White,
    Pink,
    #[default]
    Brown,
    Rain,
    Fan,
    /// No noise bed
    Silence,
}

impl NoiseType {
    /// All noise types, in display order.
    pub const ALL: [NoiseType; 6] = [
        NoiseType::White,
        NoiseType::Pink,
        NoiseType::Brown,
        NoiseType::Rain,
        NoiseType::Fan,
        NoiseType::Silence,
    ];

    /// Lowercase key used in config files and library directory names.
    pub fn key(&self) -> &'static str {
        match self {
            NoiseType::White => "white",
            NoiseType::Pink => "pink",
            NoiseType::Brown => "brown",
            NoiseType::Rain => "rain",
            NoiseType::Fan => "fan",
            NoiseType::Silence => "silence",
        }
    }

    /// Guess the noise type from a resource name such as `brown-noise.mp3`.
    pub fn from_resource(resource: &ResourceRef) -> Option<Self> {
        let name = resource.display_name().to_lowercase();
        NoiseType::ALL
            .into_iter()
            .find(|noise| name.contains(noise.key()))
    }
}

impl std::fmt::Display for NoiseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoiseType::White => write!(f, "White noise"),
            NoiseType::Pink => write!(f, "Pink noise"),
            NoiseType::Brown => write!(f, "Brown noise"),
            NoiseType::Rain => write!(f, "Rain"),
            NoiseType::Fan => write!(f, "Fan"),
            NoiseType::Silence => write!(f, "Silence"),
        }
    }
}

impl FromStr for NoiseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        NoiseType::ALL
            .into_iter()
            .find(|noise| key == noise.key() || key == format!("{}-noise", noise.key()))
            .ok_or_else(|| format!("unknown noise type '{}'", s))
    }
}

/// Nominal volumes for the three layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub background: f32,
    pub alternate_background: f32,
    pub foreground: f32,
}

impl VolumeProfile {
    pub const fn new(background: f32, alternate_background: f32, foreground: f32) -> Self {
        Self {
            background,
            alternate_background,
            foreground,
        }
    }

    /// Same profile with every volume clamped to [0, 1].
    pub fn clamped(self) -> Self {
        Self {
            background: self.background.clamp(0.0, 1.0),
            alternate_background: self.alternate_background.clamp(0.0, 1.0),
            foreground: self.foreground.clamp(0.0, 1.0),
        }
    }
}

/// Volume profile per noise type.
///
/// Louder beds need louder prompts on top of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeTable {
    pub white: VolumeProfile,
    pub pink: VolumeProfile,
    pub brown: VolumeProfile,
    pub rain: VolumeProfile,
    pub fan: VolumeProfile,
    pub silence: VolumeProfile,
}

impl Default for VolumeTable {
    fn default() -> Self {
        Self {
            white: VolumeProfile::new(0.30, 0.25, 0.60),
            pink: VolumeProfile::new(0.35, 0.25, 0.60),
            brown: VolumeProfile::new(0.40, 0.30, 0.65),
            rain: VolumeProfile::new(0.45, 0.30, 0.70),
            fan: VolumeProfile::new(0.35, 0.25, 0.65),
            silence: VolumeProfile::new(0.0, 0.30, 0.55),
        }
    }
}

impl VolumeTable {
    /// Profile for a noise type, clamped to the valid range.
    pub fn profile(&self, noise: NoiseType) -> VolumeProfile {
        let profile = match noise {
            NoiseType::White => self.white,
            NoiseType::Pink => self.pink,
            NoiseType::Brown => self.brown,
            NoiseType::Rain => self.rain,
            NoiseType::Fan => self.fan,
            NoiseType::Silence => self.silence,
        };
        profile.clamped()
    }
}

/// The noise bed currently selected for the background layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientBackground {
    pub noise: NoiseType,
    pub resource: ResourceRef,
    pub label: String,
}

impl AmbientBackground {
    pub fn new(noise: NoiseType, resource: ResourceRef, label: impl Into<String>) -> Self {
        Self {
            noise,
            resource,
            label: label.into(),
        }
    }
}

impl Default for AmbientBackground {
    fn default() -> Self {
        Self::new(
            NoiseType::Brown,
            ResourceRef::builtin("brown-noise"),
            NoiseType::Brown.to_string(),
        )
    }
}
