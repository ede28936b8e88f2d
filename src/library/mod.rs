//! Media library and clip rotation.
//!
//! Lists audio files per directory (cached for the session), tracks which
//! files a routine already used so that later draws avoid repeats, and
//! resolves resource references to paths on disk.

use crate::routines::ResourceRef;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding the fixed builtin resources.
pub const BUILTIN_DIR: &str = "builtin";

/// File extensions treated as playable audio.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];

/// Errors raised while reading the media library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to list {dir}: {message}")]
    ListFailed { dir: String, message: String },
}

/// File-selection service consumed by routines and the scheduler.
pub trait FileSelector: Send + Sync {
    /// Sorted audio file names in a library directory.
    fn list_files(&self, dir: &str) -> Vec<String>;

    /// Files in `dir` not yet marked used.
    ///
    /// When fewer than `min_required` remain, usage tracking for `dir` is
    /// reset and the full pool is returned.
    fn unused_files(&self, dir: &str, min_required: usize) -> Vec<String>;

    /// Record files as used so later draws skip them.
    fn mark_used(&self, dir: &str, files: &[String]);

    /// Resolve a resource to an existing file, or `None` if it is gone.
    fn resolve_path(&self, resource: &ResourceRef) -> Option<PathBuf>;
}

/// Directory-backed media library.
pub struct MediaLibrary {
    root: PathBuf,
    listings: Mutex<HashMap<String, Vec<String>>>,
    used: Mutex<HashMap<String, HashSet<String>>>,
}

impl MediaLibrary {
    /// Create a library rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listings: Mutex::new(HashMap::new()),
            used: Mutex::new(HashMap::new()),
        }
    }

    /// Library root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop cached listings so the next lookup rereads the disk.
    pub fn refresh(&self) {
        self.listings.lock().clear();
        tracing::debug!("Media library cache cleared");
    }

    /// Number of files currently marked used in `dir`.
    pub fn used_count(&self, dir: &str) -> usize {
        self.used.lock().get(dir).map(|u| u.len()).unwrap_or(0)
    }

    fn read_listing(&self, dir: &str) -> Result<Vec<String>, LibraryError> {
        let path = self.root.join(dir);
        let entries = std::fs::read_dir(&path).map_err(|e| LibraryError::ListFailed {
            dir: dir.to_string(),
            message: e.to_string(),
        })?;

        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| is_audio_file(name))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FileSelector for MediaLibrary {
    fn list_files(&self, dir: &str) -> Vec<String> {
        if let Some(files) = self.listings.lock().get(dir) {
            return files.clone();
        }

        match self.read_listing(dir) {
            Ok(files) => {
                tracing::debug!("Listed {} audio files in {}", files.len(), dir);
                self.listings.lock().insert(dir.to_string(), files.clone());
                files
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Vec::new()
            }
        }
    }

    fn unused_files(&self, dir: &str, min_required: usize) -> Vec<String> {
        let all = self.list_files(dir);
        let mut used = self.used.lock();
        let used_in_dir = used.entry(dir.to_string()).or_default();

        let unused: Vec<String> = all
            .iter()
            .filter(|f| !used_in_dir.contains(*f))
            .cloned()
            .collect();

        if unused.len() < min_required {
            tracing::debug!(
                "Only {} unused files left in {} (need {}), resetting rotation",
                unused.len(),
                dir,
                min_required
            );
            used_in_dir.clear();
            return all;
        }

        unused
    }

    fn mark_used(&self, dir: &str, files: &[String]) {
        let mut used = self.used.lock();
        let used_in_dir = used.entry(dir.to_string()).or_default();
        used_in_dir.extend(files.iter().cloned());
    }

    fn resolve_path(&self, resource: &ResourceRef) -> Option<PathBuf> {
        let path = match resource {
            ResourceRef::Builtin(id) => {
                let name = self
                    .list_files(BUILTIN_DIR)
                    .into_iter()
                    .find(|name| file_stem(name) == id.as_str())?;
                self.root.join(BUILTIN_DIR).join(name)
            }
            ResourceRef::File { dir, name } => self.root.join(dir).join(name),
            ResourceRef::Path(path) => path.clone(),
        };

        path.is_file().then_some(path)
    }
}

/// Whether a file name carries a playable audio extension.
pub fn is_audio_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// File name without its extension.
pub fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}
