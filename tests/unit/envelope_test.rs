//! Unit tests for fades and spoken reminders.

use somnus::audio::tts::text_utils;
use somnus::audio::{fade, step_volume, Announcer, FadeSpec, LogSynth, ScheduledAnnouncer};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_step_volume_midpoint() {
    assert!((step_volume(0.0, 0.4, 20, 40) - 0.2).abs() < 1e-6);
    assert!((step_volume(0.5, 0.1, 10, 20) - 0.3).abs() < 1e-6);
    assert!((step_volume(0.4, 0.14, 0, 5) - 0.4).abs() < 1e-6);
}

#[test]
fn test_step_volume_clamps() {
    assert_eq!(step_volume(0.8, 1.5, 4, 4), 1.0);
    assert_eq!(step_volume(0.2, -0.3, 4, 4), 0.0);
    assert_eq!(step_volume(0.5, 0.9, 0, 0), 0.9);
}

#[tokio::test(start_paused = true)]
async fn test_fade_reaches_finish() {
    let cancel = AtomicBool::new(false);
    let mut applied = Vec::new();
    let spec = FadeSpec::new(40, Duration::from_millis(500));

    let start = tokio::time::Instant::now();
    let last = fade(spec, 0.0, 0.4, &cancel, |v| applied.push(v)).await;

    assert!((last - 0.4).abs() < 1e-6);
    assert_eq!(applied.len(), 40);
    assert!(applied.windows(2).all(|w| w[0] <= w[1]));
    assert!(start.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_fade_applies_nothing() {
    let cancel = AtomicBool::new(true);
    let mut applied = Vec::new();

    let last = fade(FadeSpec::new(5, Duration::from_millis(100)), 0.4, 0.14, &cancel, |v| {
        applied.push(v)
    })
    .await;

    assert!(applied.is_empty());
    assert!((last - 0.4).abs() < 1e-6);
}

#[test]
fn test_reminder_text() {
    assert_eq!(
        text_utils::reminder(1, 2),
        "Reminder one of two. Are you dreaming?"
    );
    assert_eq!(text_utils::format_minutes(10), "ten minutes");
    assert_eq!(text_utils::format_minutes(90), "1 hours and 30 minutes");
}

#[tokio::test(start_paused = true)]
async fn test_disabled_announcer_stays_silent() {
    let synth = Arc::new(LogSynth::new());
    let announcer = ScheduledAnnouncer::new(synth.clone(), false);

    announcer.announce_now("hello");
    announcer.schedule_routine_announcements(2, 10);

    assert!(!announcer.has_pending());
    assert!(synth.spoken().is_empty());
}
