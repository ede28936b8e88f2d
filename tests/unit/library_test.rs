//! Unit tests for the media library.

use somnus::library::{FileSelector, MediaLibrary};
use somnus::routines::ResourceRef;
use tempfile::TempDir;

fn library(files: &[&str]) -> (TempDir, MediaLibrary) {
    let tmp = TempDir::new().unwrap();
    for file in files {
        let path = tmp.path().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }
    let library = MediaLibrary::new(tmp.path());
    (tmp, library)
}

#[test]
fn test_rotation_avoids_repeats_until_exhausted() {
    let (_tmp, library) = library(&[
        "clips/a.mp3",
        "clips/b.mp3",
        "clips/c.mp3",
        "clips/d.mp3",
    ]);

    let first = library.unused_files("clips", 2);
    assert_eq!(first.len(), 4);
    library.mark_used("clips", &first[..2]);

    let second = library.unused_files("clips", 2);
    assert_eq!(second, vec!["c.mp3", "d.mp3"]);
    library.mark_used("clips", &second);

    // Pool exhausted: everything is available again
    assert_eq!(library.unused_files("clips", 1).len(), 4);
}

#[test]
fn test_rotation_is_per_directory() {
    let (_tmp, library) = library(&["a/one.mp3", "b/one.mp3"]);

    library.mark_used("a", &["one.mp3".to_string()]);
    assert_eq!(library.used_count("a"), 1);
    assert_eq!(library.used_count("b"), 0);
}

#[test]
fn test_resolve_file_and_builtin() {
    let (tmp, library) = library(&["builtin/wild_prompt.wav", "wild/main/main01.mp3"]);

    assert_eq!(
        library.resolve_path(&ResourceRef::builtin("wild_prompt")),
        Some(tmp.path().join("builtin").join("wild_prompt.wav"))
    );
    assert_eq!(
        library.resolve_path(&ResourceRef::file("wild/main", "main01.mp3")),
        Some(tmp.path().join("wild").join("main").join("main01.mp3"))
    );
    assert_eq!(library.resolve_path(&ResourceRef::builtin("ssild_long_1")), None);
}
