//! End-to-end scheduler scenarios on the simulated backend.
//!
//! All tests run on paused time, so routines lasting minutes finish at once.

use crate::support::{wait_for_finish, Fixture};
use somnus::audio::SimulatedBackend;
use somnus::routines::{pod, ResourceRef};
use somnus::scheduler::{Layer, PlayOutcome, PlayRequest, PlaybackEvent};
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn close(actual: f32, expected: f32) -> bool {
    (actual - expected).abs() < 1e-3
}

#[tokio::test(start_paused = true)]
async fn test_second_play_is_ignored() {
    let fx = Fixture::new().await;

    assert_eq!(fx.manager.play_routines(PlayRequest::new(["wild"])), PlayOutcome::Started);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(fx.manager.status().as_deref(), Some("WILD"));

    assert_eq!(
        fx.manager.play_routines(PlayRequest::new(["mild"])),
        PlayOutcome::AlreadyRunning
    );
    sleep(Duration::from_secs(1)).await;
    assert_eq!(fx.manager.status().as_deref(), Some("WILD"));

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_tags_play_nothing() {
    let fx = Fixture::new().await;

    let outcome = fx.manager.play_routines(PlayRequest::new(["lucid", ""]));
    assert_eq!(outcome, PlayOutcome::NothingToPlay);
    assert!(!fx.manager.is_foreground_active());
}

#[tokio::test(start_paused = true)]
async fn test_wild_runs_ambience_under_cues() {
    let fx = Fixture::new().await;

    fx.manager.play_routines(PlayRequest::new(["wild"]));
    sleep(Duration::from_secs(10)).await;

    assert!(fx.manager.is_playing(Layer::Background));
    assert!(fx.manager.is_active(Layer::AlternateBackground));
    assert!(close(fx.manager.volumes().background, 0.4));
}

#[tokio::test(start_paused = true)]
async fn test_stop_foreground_keeps_background_layers() {
    let fx = Fixture::new().await;

    fx.manager.play_routines(PlayRequest::new(["wild"]));
    sleep(Duration::from_secs(10)).await;
    fx.manager.stop_foreground();

    assert!(!fx.manager.is_foreground_active());
    assert!(fx.manager.handle(Layer::Foreground).is_none());
    assert!(fx.manager.is_playing(Layer::Background));
    assert!(fx.manager.is_active(Layer::AlternateBackground));

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_releases_everything() {
    let fx = Fixture::new().await;

    fx.manager.play_routines(PlayRequest::new(["wild"]));
    sleep(Duration::from_secs(10)).await;
    fx.manager.stop_all();

    for layer in Layer::ALL {
        assert!(fx.manager.handle(layer).is_none(), "{} still loaded", layer);
        assert!(!fx.manager.is_active(layer), "{} still running", layer);
    }
    assert_eq!(fx.backend.loaded_count(), 0);
    assert_eq!(fx.manager.status(), None);

    // Nothing comes back afterwards
    sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.backend.loaded_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_cue_keeps_its_delay() {
    let fx = Fixture::new().await;
    let mut events = fx.manager.subscribe();

    let started = Instant::now();
    fx.manager.play_routines(PlayRequest::new(["ssild"]));
    let seen = wait_for_finish(&mut events).await;

    let skipped: Vec<&ResourceRef> = seen
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::CueSkipped { resource, .. } => Some(resource),
            _ => None,
        })
        .collect();
    assert_eq!(
        skipped,
        vec![
            &ResourceRef::builtin("ssild_long_1"),
            &ResourceRef::builtin("ssild_long_2")
        ]
    );
    // Two short rounds of 20s plus two skipped long rounds of 45s
    assert!(started.elapsed() >= Duration::from_secs(130));
}

#[tokio::test(start_paused = true)]
async fn test_routines_play_back_to_back() {
    let fx = Fixture::new().await;
    let mut events = fx.manager.subscribe();

    fx.manager
        .play_routines(PlayRequest::new(["mild-prompt", "ssild"]).with_event_label("Night 3"));
    let seen = wait_for_finish(&mut events).await;

    let labels: Vec<&str> = seen
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::RoutineStarted { label, .. } => Some(label.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["Night 3: MILD prompt", "Night 3: SSILD"]);

    let finished = seen
        .iter()
        .filter(|event| matches!(event, PlaybackEvent::RoutineFinished { .. }))
        .count();
    assert_eq!(finished, 2);
    assert!(!fx.manager.is_foreground_active());
}

#[tokio::test(start_paused = true)]
async fn test_prompt_schedules_reminders() {
    let fx = Fixture::new().await;
    let mut events = fx.manager.subscribe();

    fx.manager.play_routines(PlayRequest::new(["mild-prompt"]));
    let seen = wait_for_finish(&mut events).await;

    let cues = seen
        .iter()
        .filter(|event| matches!(event, PlaybackEvent::CueStarted { .. }))
        .count();
    assert_eq!(cues, 2);
    assert!(fx.announcer.has_pending());

    sleep(Duration::from_secs(21 * 60)).await;
    assert_eq!(fx.announcer.synth().spoken().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_end_background_switches_bed() {
    let fx = Fixture::new().await;
    let mut events = fx.manager.subscribe();

    let request = PlayRequest::new(["mild-prompt"])
        .with_end_background(ResourceRef::builtin("rain-noise"), "Rain until morning");
    fx.manager.play_routines(request);
    wait_for_finish(&mut events).await;

    assert_eq!(fx.manager.status().as_deref(), Some("Rain until morning"));
    assert_eq!(
        fx.manager.resource(Layer::Background),
        Some(ResourceRef::builtin("rain-noise"))
    );
    assert!(fx.manager.is_playing(Layer::Background));
}

#[tokio::test(start_paused = true)]
async fn test_sequence_without_end_label_clears_status() {
    let fx = Fixture::new().await;
    let mut events = fx.manager.subscribe();

    fx.manager.play_routines(PlayRequest::new(["mild-prompt"]));
    wait_for_finish(&mut events).await;

    assert_eq!(fx.manager.status(), None);
    assert!(fx.manager.is_playing(Layer::Background));
    assert!(close(fx.manager.volumes().background, 0.4));
}

#[tokio::test(start_paused = true)]
async fn test_play_replaces_preview() {
    let fx = Fixture::new().await;

    assert!(fx.manager.preview(&ResourceRef::builtin("wild_prompt")));
    let preview = fx.manager.handle(Layer::Foreground).unwrap();
    assert!(fx.backend.volume(preview).is_some());

    assert_eq!(
        fx.manager.play_routines(PlayRequest::new(["mild-prompt"])),
        PlayOutcome::Started
    );
    assert!(fx.backend.volume(preview).is_none());

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_preview_of_missing_file_is_refused() {
    let fx = Fixture::new().await;

    assert!(!fx.manager.preview(&ResourceRef::builtin("ssild_long_1")));
    assert!(fx.manager.handle(Layer::Foreground).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_restore_after_interruption_fades_up() {
    let fx = Fixture::new().await;

    assert!(fx.manager.restore_after_interruption().await);
    assert!(fx.manager.volumes().background < 0.05);

    sleep(Duration::from_secs(25)).await;
    assert!(close(fx.manager.volumes().background, 0.4));
    let handle = fx.manager.handle(Layer::Background).unwrap();
    assert!(close(fx.backend.volume(handle).unwrap_or_default(), 0.4));
}

#[tokio::test(start_paused = true)]
async fn test_pod_duck_lifts_after_time_limit() {
    let fx = Fixture::new().await;
    let episode = fx.path(&format!("{}/episode_01.mp3", pod::EPISODES_DIR));
    fx.backend.set_duration(episode, Duration::from_secs(2 * 3600));

    fx.manager.play_routines(PlayRequest::new(["pod"]));
    sleep(Duration::from_secs(60)).await;
    assert!(close(fx.manager.volumes().background, 0.06));
    assert!(fx.manager.is_playing(Layer::Foreground));

    sleep(Duration::from_secs(31 * 60)).await;
    assert!(close(fx.manager.volumes().background, 0.4));
    assert!(fx.manager.is_foreground_active());

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_skips_cue() {
    let fx = Fixture::new().await;
    fx.backend
        .fail_loads_for(fx.path("prompts/mild/foreground.mp3"));
    let mut events = fx.manager.subscribe();

    fx.manager.play_routines(PlayRequest::new(["mild-prompt"]));
    let seen = wait_for_finish(&mut events).await;

    assert!(seen.iter().any(|event| matches!(
        event,
        PlaybackEvent::LoadFailed { resource, .. }
            if *resource == ResourceRef::file("prompts/mild", "foreground.mp3")
    )));
    let cues = seen
        .iter()
        .filter(|event| matches!(event, PlaybackEvent::CueStarted { .. }))
        .count();
    assert_eq!(cues, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_load_plays_after_bounded_wait() {
    let fast = Fixture::new().await;
    let mut events = fast.manager.subscribe();
    let started = Instant::now();
    fast.manager.play_routines(PlayRequest::new(["mild-prompt"]));
    wait_for_finish(&mut events).await;
    let fast_elapsed = started.elapsed();

    // Decoding outlasts 20 polls of 100ms, so each cue plays still loading
    let slow = Fixture::with_backend(
        SimulatedBackend::new(Duration::from_secs(1)).with_load_latency(Duration::from_secs(3)),
    )
    .await;
    let mut events = slow.manager.subscribe();
    let started = Instant::now();
    slow.manager.play_routines(PlayRequest::new(["mild-prompt"]));
    let seen = wait_for_finish(&mut events).await;
    let slow_elapsed = started.elapsed();

    let cues = seen
        .iter()
        .filter(|event| matches!(event, PlaybackEvent::CueStarted { .. }))
        .count();
    assert_eq!(cues, 2);
    assert!(!seen
        .iter()
        .any(|event| matches!(event, PlaybackEvent::LoadFailed { .. })));

    // Two cues, each waiting out the full poll budget and no longer
    assert!(slow_elapsed >= fast_elapsed + Duration::from_millis(3500));
    assert!(slow_elapsed < fast_elapsed + Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_stop_background_keeps_other_layers() {
    let fx = Fixture::new().await;

    fx.manager.play_routines(PlayRequest::new(["wild"]));
    sleep(Duration::from_secs(10)).await;
    fx.manager.stop_background();

    assert!(fx.manager.handle(Layer::Background).is_none());
    assert!(!fx.manager.is_playing(Layer::Background));
    assert!(fx.manager.is_active(Layer::AlternateBackground));
    assert!(fx.manager.is_foreground_active());
    assert!(!fx.manager.volumes().ducked_for_cue);

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_stop_alternate_background_clears_cue_duck() {
    let fx = Fixture::new().await;

    fx.manager.play_routines(PlayRequest::new(["wild"]));
    let deadline = Instant::now() + Duration::from_secs(600);
    while !fx.manager.volumes().ducked_for_cue {
        assert!(Instant::now() < deadline, "prompt never ducked the bed");
        sleep(Duration::from_millis(500)).await;
    }

    fx.manager.stop_alternate_background();

    assert!(!fx.manager.volumes().ducked_for_cue);
    assert!(fx.manager.handle(Layer::AlternateBackground).is_none());
    assert!(!fx.manager.is_active(Layer::AlternateBackground));
    assert!(fx.manager.is_playing(Layer::Background));
    assert!(fx.manager.is_foreground_active());

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_stop_background_cancels_duck_timer() {
    let fx = Fixture::new().await;
    let episode = fx.path(&format!("{}/episode_01.mp3", pod::EPISODES_DIR));
    fx.backend.set_duration(episode, Duration::from_secs(2 * 3600));

    fx.manager.play_routines(PlayRequest::new(["pod"]));
    sleep(Duration::from_secs(60)).await;
    fx.manager.stop_background();

    sleep(Duration::from_secs(31 * 60)).await;
    assert!(close(fx.manager.volumes().background, 0.06));
    assert!(fx.manager.handle(Layer::Background).is_none());
    assert!(fx.manager.is_foreground_active());

    fx.manager.stop_all();
}

#[tokio::test(start_paused = true)]
async fn test_stop_foreground_keeps_duck_timer() {
    let fx = Fixture::new().await;
    let episode = fx.path(&format!("{}/episode_01.mp3", pod::EPISODES_DIR));
    fx.backend.set_duration(episode, Duration::from_secs(2 * 3600));

    fx.manager.play_routines(PlayRequest::new(["pod"]));
    sleep(Duration::from_secs(60)).await;
    fx.manager.stop_foreground();
    assert!(!fx.manager.is_foreground_active());

    sleep(Duration::from_secs(31 * 60)).await;
    assert!(close(fx.manager.volumes().background, 0.4));
    assert!(fx.manager.is_playing(Layer::Background));
    let handle = fx.manager.handle(Layer::Background).unwrap();
    assert!(close(fx.backend.volume(handle).unwrap_or_default(), 0.4));
}
