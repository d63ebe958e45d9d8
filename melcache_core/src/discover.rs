//! Recursive discovery of audio files under a root directory.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// File name suffixes accepted as audio. Matched case-sensitively.
pub const AUDIO_EXTENSIONS: [&str; 2] = [".wav", ".mp3"];

pub fn is_audio_file_name(file_name: &str) -> bool {
    AUDIO_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

/// Walk `root` and every subdirectory, returning all `.wav` / `.mp3` files
/// sorted by path.
///
/// A missing root, or any entry the walk cannot read, fails the whole call.
pub fn discover_audio_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(is_audio_file_name);
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();

    tracing::info!("found {} audio files under {}", files.len(), root.display());
    Ok(files)
}
