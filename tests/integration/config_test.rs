//! Configuration feeding the scheduler.

use somnus::routines::NoiseType;
use somnus::storage::config::{load_config_from, save_config_to, AppConfig};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_mixing_overrides_reach_engine() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        "[mixing]\nduck_factor = 0.5\nsettle_delay_ms = 250\nrestore_fade_steps = 10\n\n[volumes.brown]\nbackground = 0.5\nalternate_background = 0.2\nforeground = 0.7\n",
    )
    .unwrap();

    let config = load_config_from(&path, tmp.path().into()).unwrap();
    let settings = config.engine_settings();

    assert_eq!(settings.duck_factor, 0.5);
    assert_eq!(settings.settle_delay, Duration::from_millis(250));
    assert_eq!(settings.restore_fade.steps, 10);
    assert_eq!(settings.restore_fade.step_delay, Duration::from_millis(500));
    assert_eq!(settings.volumes.profile(NoiseType::Brown).background, 0.5);
}

#[test]
fn test_out_of_range_duck_factor_is_clamped() {
    let mut config = AppConfig::default();
    config.mixing.duck_factor = 3.0;
    assert_eq!(config.engine_settings().duck_factor, 1.0);
}

#[test]
fn test_saved_config_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");

    let mut config = AppConfig::default();
    config.speech.enabled = false;
    save_config_to(&config, &path).unwrap();

    let loaded = load_config_from(&path, tmp.path().into()).unwrap();
    assert!(!loaded.speech.enabled);
    assert_eq!(loaded.mixing, config.mixing);
}
