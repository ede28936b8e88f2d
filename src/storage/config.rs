//! Application configuration.
//!
//! Loaded from `config.toml` in the platform data directory; a missing file
//! yields the defaults.

use crate::audio::FadeSpec;
use crate::routines::VolumeTable;
use crate::scheduler::EngineSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Media library settings
    pub library: LibrarySettings,
    /// Mixing and timing settings
    pub mixing: MixingSettings,
    /// Nominal layer volumes per noise type
    pub volumes: VolumeTable,
    /// Spoken announcement settings
    pub speech: SpeechSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            library: LibrarySettings::default(),
            mixing: MixingSettings::default(),
            volumes: VolumeTable::default(),
            speech: SpeechSettings::default(),
        }
    }
}

impl AppConfig {
    /// Media root, defaulting to `<data_dir>/media`.
    pub fn library_root(&self) -> PathBuf {
        self.library
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("media"))
    }

    /// Settings consumed by the scheduler.
    pub fn engine_settings(&self) -> EngineSettings {
        let mixing = &self.mixing;
        EngineSettings {
            duck_factor: mixing.duck_factor.clamp(0.0, 1.0),
            settle_delay: Duration::from_millis(mixing.settle_delay_ms),
            cue_duck_hold: Duration::from_millis(mixing.cue_duck_hold_ms),
            load_poll_retries: mixing.load_poll_retries,
            load_poll_interval: Duration::from_millis(mixing.load_poll_interval_ms),
            play_poll_interval: Duration::from_millis(mixing.play_poll_interval_ms.max(1)),
            restore_fade: FadeSpec::new(
                mixing.restore_fade_steps,
                Duration::from_millis(mixing.restore_fade_step_ms),
            ),
            cue_duck: FadeSpec::new(
                mixing.cue_duck_steps,
                Duration::from_millis(mixing.cue_duck_step_ms),
            ),
            volumes: self.volumes.clone(),
        }
    }
}

/// Media library settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Media root directory
    pub root: Option<PathBuf>,
}

/// Mixing and timing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingSettings {
    /// Background level during a per-cue duck (fraction of nominal)
    pub duck_factor: f32,
    pub settle_delay_ms: u64,
    pub cue_duck_hold_ms: u64,
    pub load_poll_retries: u32,
    pub load_poll_interval_ms: u64,
    pub play_poll_interval_ms: u64,
    pub restore_fade_steps: u32,
    pub restore_fade_step_ms: u64,
    pub cue_duck_steps: u32,
    pub cue_duck_step_ms: u64,
}

impl Default for MixingSettings {
    fn default() -> Self {
        Self {
            duck_factor: 0.35,
            settle_delay_ms: 1000,
            cue_duck_hold_ms: 1500,
            load_poll_retries: 20,
            load_poll_interval_ms: 100,
            play_poll_interval_ms: 250,
            restore_fade_steps: 40,
            restore_fade_step_ms: 500,
            cue_duck_steps: 5,
            cue_duck_step_ms: 100,
        }
    }
}

/// Spoken announcement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Speak reminders at all
    pub enabled: bool,
    /// Speech rate (0.5 - 2.0)
    pub rate: f32,
    /// Speech volume (0.0 - 1.0)
    pub volume: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 0.9,
            volume: 0.8,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "somnus", "Somnus")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&get_config_path(), get_data_dir())
}

/// Load configuration from `path`, using `data_dir` for derived paths.
pub fn load_config_from(path: &Path, data_dir: PathBuf) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(AppConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = data_dir;

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save configuration to `path`.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content = to_toml(config)?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Render configuration as TOML.
pub fn to_toml(config: &AppConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
