//! Markdown document discovery and decoding.
//!
//! Walks the documents directory recursively, keeps files matching the
//! include globs (and none of the exclude globs), and reads each one into a
//! [`Document`] with its title and modification time.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::models::Document;

/// Directories that never hold documentation.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// List matching documents under `root`, sorted by path.
///
/// A missing `root` is not an error: it yields an empty list so an index
/// can still be built.
pub fn scan_documents(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        tracing::warn!(root = %root.display(), "documents directory does not exist");
        return Ok(Vec::new());
    }

    let include_set = build_globset(include_globs)?;

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) {
            continue;
        }
        if !include_set.is_match(rel_str.as_ref()) {
            continue;
        }

        paths.push(path.to_path_buf());
    }

    // Sort for deterministic passage order
    paths.sort();
    Ok(paths)
}

/// Newest modification time among `paths`, ignoring files that cannot be
/// stat'ed.
pub fn latest_modified(paths: &[PathBuf]) -> Option<SystemTime> {
    paths
        .iter()
        .filter_map(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok())
        .max()
}

/// Read a document: decode its text, extract its title, record its mtime.
pub fn read_document(path: &Path) -> Result<Document> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let text = decode_text(bytes);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let title = extract_title(&text, &file_name);

    Ok(Document {
        path: path.to_path_buf(),
        title,
        text,
        modified,
    })
}

/// Decode as UTF-8, dropping stray invalid bytes.
///
/// When no non-ASCII byte forms valid UTF-8 the file is taken to be Latin-1
/// instead (every byte maps to the code point of the same value).
pub fn decode_text(bytes: Vec<u8>) -> String {
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return text,
        Err(e) => e.into_bytes(),
    };

    let mut text = String::with_capacity(bytes.len());
    let mut utf8_multibyte = false;
    for chunk in bytes.utf8_chunks() {
        let valid = chunk.valid();
        utf8_multibyte |= !valid.is_ascii();
        text.push_str(valid);
    }

    if utf8_multibyte {
        text
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// First top-level heading (`# Title`), or `default` when there is none.
pub fn extract_title(text: &str, default: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .unwrap_or_else(|| default.to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
