//! Flat-file access for note directories.

use regex::{Regex, RegexBuilder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const NOTE_SUFFIX: &str = ".txt";

/// File names in `dir` ending with `suffix`, in directory listing order.
/// A directory that does not exist yields an empty list.
pub fn list_filenames_with_suffix(dir: &Path, suffix: &str) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(suffix) {
            names.push(name);
        }
    }
    Ok(names)
}

pub fn read_text(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Overwrite `path` with `text`, creating parent directories as needed.
pub fn write_text(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

/// First note file whose name starts with `id`, scanning `directories` in order.
///
/// Within a directory the scan follows the filesystem's listing order, which
/// is unspecified. If two notes share a zk_uid prefix either may be returned.
pub fn find_note_filepath(id: &str, directories: &[PathBuf]) -> io::Result<Option<PathBuf>> {
    if id.is_empty() {
        return Ok(None);
    }
    for dir in directories {
        for name in list_filenames_with_suffix(dir, NOTE_SUFFIX)? {
            if name.starts_with(id) {
                return Ok(Some(dir.join(name)));
            }
        }
    }
    Ok(None)
}

/// Case-insensitive regex search over raw note text. A keyword that is not a
/// valid pattern is matched literally.
pub fn search_notes(keyword: &str, dir: &Path) -> io::Result<Vec<String>> {
    let Some(matcher) = keyword_matcher(keyword) else {
        tracing::warn!("Keyword {:?} cannot be searched", keyword);
        return Ok(Vec::new());
    };
    let mut hits = Vec::new();
    for name in list_filenames_with_suffix(dir, NOTE_SUFFIX)? {
        let text = match read_text(&dir.join(&name)) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping {} in search: {}", name, e);
                continue;
            }
        };
        if matcher.is_match(&text) {
            hits.push(name);
        }
    }
    Ok(hits)
}

fn keyword_matcher(keyword: &str) -> Option<Regex> {
    let build = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
    build(keyword).or_else(|_| build(&regex::escape(keyword))).ok()
}
