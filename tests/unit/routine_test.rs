//! Unit tests for routine cue sequences.
//!
//! Positions of the inserted cues must not depend on the random draw.

use rand::rngs::StdRng;
use rand::SeedableRng;
use somnus::library::MediaLibrary;
use somnus::routines::{
    mild, pod, wild, AmbientBackground, Cue, NoiseType, ResourceRef, Routine, RoutineKind,
    RoutineParams, VolumeTable,
};
use std::path::Path;
use tempfile::TempDir;

fn touch(root: &Path, dir: &str, names: &[String]) {
    let path = root.join(dir);
    std::fs::create_dir_all(&path).unwrap();
    for name in names {
        std::fs::write(path.join(name), b"").unwrap();
    }
}

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}{:02}.mp3", prefix, i)).collect()
}

fn library() -> (TempDir, MediaLibrary) {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), wild::CLIPS_DIR, &numbered("clip", 12));
    touch(tmp.path(), wild::MAIN_DIR, &numbered("main", 3));
    touch(tmp.path(), mild::CLIPS_DIR, &numbered("mild", 12));
    touch(
        tmp.path(),
        pod::EPISODES_DIR,
        &["episode_1.mp3".to_string(), "episode_2.mp3".to_string()],
    );
    let library = MediaLibrary::new(tmp.path());
    (tmp, library)
}

fn params(play_count: u32) -> RoutineParams {
    let mut params = RoutineParams::new(AmbientBackground::default(), &VolumeTable::default());
    params.play_count = play_count;
    params
}

fn sequence(kind: RoutineKind, play_count: u32, library: &MediaLibrary, seed: u64) -> Vec<Cue> {
    let routine = Routine::build(kind, &params(play_count));
    let mut rng = StdRng::seed_from_u64(seed);
    routine.spec().cue_sequence(library, &mut rng)
}

fn is_builtin(cue: &Cue, id: &str) -> bool {
    cue.resource == ResourceRef::builtin(id)
}

#[test]
fn test_wild_scenario_brown_noise() {
    let (_tmp, library) = library();

    for seed in 0..5 {
        let cues = sequence(RoutineKind::Wild, 2, &library, seed);

        assert_eq!(cues.len(), 11);
        // Prompt at position 4 (1-indexed)
        assert!(is_builtin(&cues[3], "wild_prompt"));
        assert!(cues[3].duck_override);
        assert!(is_builtin(&cues[6], "wild_tuning"));
        assert!(matches!(
            &cues[7].resource,
            ResourceRef::File { dir, .. } if dir == wild::MAIN_DIR
        ));
        assert_eq!(cues[7].effective_multiplier(), Some(0.85));

        let clips = cues
            .iter()
            .filter(|c| matches!(&c.resource, ResourceRef::File { dir, .. } if dir == wild::CLIPS_DIR))
            .count();
        assert_eq!(clips, 8);
    }
}

#[test]
fn test_wild_draws_rotate() {
    let (_tmp, library) = library();

    let first = sequence(RoutineKind::Wild, 1, &library, 1);
    assert_eq!(library.used_count(wild::CLIPS_DIR), 8);

    // 4 unused left, 8 needed: the rotation resets before the second draw
    let second = sequence(RoutineKind::Wild, 1, &library, 2);
    assert_eq!(library.used_count(wild::CLIPS_DIR), 8);
    assert_eq!(first.len(), second.len());
}

#[test]
fn test_mild_prompt_iff_repeat() {
    let (_tmp, library) = library();

    for play_count in 1..=4 {
        let cues = sequence(RoutineKind::Mild, play_count, &library, 9);
        let has_prompt = cues.iter().any(|c| is_builtin(c, "mild_prompt"));
        assert_eq!(has_prompt, play_count > 1, "play_count {}", play_count);

        let expected = if play_count == 1 { 3 + 6 } else { 3 + 9 + 1 };
        assert_eq!(cues.len(), expected);
        assert!(is_builtin(&cues[0], "mild_intro"));
        assert!(is_builtin(&cues[1], "mild_finish"));
        assert!(is_builtin(&cues[2], "mild_start"));
    }
}

#[test]
fn test_ssild_round_structure() {
    let (_tmp, library) = library();

    let cues = sequence(RoutineKind::Ssild, 4, &library, 0);
    assert_eq!(cues.len(), 8);
    assert!(cues[..4]
        .iter()
        .all(|c| c.resource.display_name().starts_with("ssild_short_")));
    assert!(cues[4..]
        .iter()
        .all(|c| c.resource.display_name().starts_with("ssild_long_")));
}

#[test]
fn test_pod_single_episode() {
    let (_tmp, library) = library();

    let cues = sequence(RoutineKind::Pod, 2, &library, 0);
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].resource, ResourceRef::file(pod::EPISODES_DIR, "episode_2.mp3"));

    // Episode 3 has no file of its own and wraps to the first one
    let cues = sequence(RoutineKind::Pod, 3, &library, 0);
    assert_eq!(cues[0].resource, ResourceRef::file(pod::EPISODES_DIR, "episode_1.mp3"));
}

#[test]
fn test_prompt_overrides_background_unconditionally() {
    let routine = Routine::from_tag("wild-prompt", &params(1)).unwrap();
    assert!(routine.spec().overrides_background());
    assert_eq!(routine.spec().speech_trigger_cue_index(), Some(0));
}

#[test]
fn test_volumes_follow_noise_type() {
    let ambient = AmbientBackground::new(NoiseType::Rain, ResourceRef::builtin("rain-noise"), "Rain");
    let params = RoutineParams::new(ambient, &VolumeTable::default());
    let routine = Routine::build(RoutineKind::Wild, &params);

    let meta = routine.spec().meta();
    assert_eq!(meta.background_volume, 0.45);
    assert_eq!(meta.noise, NoiseType::Rain);
}
