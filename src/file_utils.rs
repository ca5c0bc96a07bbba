// src/file_utils.rs
//
// Small filesystem helpers shared across the pipeline.

use std::fs;
use std::path::{Path, PathBuf};

/// Ensure that a directory exists, creating it (and parents) if needed.
pub fn ensure_directory(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))
}

/// Save content to a file, creating the parent directory if it doesn't exist.
pub fn save_to_file(content: &str, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

pub fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

/// Reduce an arbitrary title to something safe for a filename.
/// Non-alphanumeric runs collapse to single underscores; length is capped.
pub fn sanitize_filename(title: &str) -> String {
    const MAX_LEN: usize = 80;

    let mut result = String::with_capacity(title.len());
    let mut last_was_underscore = true; // Suppress a leading underscore
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }
    while result.ends_with('_') {
        result.pop();
    }
    if result.is_empty() {
        result.push_str("untitled");
    }
    result.truncate(MAX_LEN);
    result
}

/// Build an output path of the form `<dir>/<stem>_<suffix>.<ext>`.
pub fn output_path(dir: &Path, stem: &str, suffix: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", stem, suffix, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Office Hours #42: DAO vote!"), "Office_Hours_42_DAO_vote");
        assert_eq!(sanitize_filename("///"), "untitled");
        assert_eq!(sanitize_filename("already_clean"), "already_clean");
    }

    #[test]
    fn test_sanitize_filename_caps_length() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_filename(&long).len(), 80);
    }

    #[test]
    fn test_save_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        save_to_file("hello", &path).unwrap();
        assert_eq!(read_file(&path).unwrap(), "hello");
    }
}
