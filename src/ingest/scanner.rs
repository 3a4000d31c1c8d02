//! Backlog scan and artifact matching

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{WorkQueue, TEXT_AREA_MARKER};

/// Decides whether a path is a sample artifact
#[derive(Debug, Clone)]
pub struct ArtifactMatcher {
    glob: GlobMatcher,
}

impl ArtifactMatcher {
    /// `pattern` is matched against the file name only
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern)
            .with_context(|| format!("Invalid file name pattern {:?}", pattern))?
            .compile_matcher();
        Ok(Self { glob })
    }

    pub fn matches(&self, path: &Path) -> bool {
        if path.to_string_lossy().contains(TEXT_AREA_MARKER) {
            return false;
        }
        path.file_name()
            .map(|name| self.glob.is_match(name))
            .unwrap_or(false)
    }
}

/// Every matching file under `root`, in path order
pub fn scan(root: &Path, matcher: &ArtifactMatcher) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && matcher.matches(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Enqueue the backlog found under `root`; returns how many were queued
pub fn enqueue_backlog(root: &Path, matcher: &ArtifactMatcher, queue: &WorkQueue) -> usize {
    let found = scan(root, matcher);
    for path in &found {
        debug!("Backlog sample {:?}", path);
        queue.push(path.clone());
    }
    info!("Backlog scan of {:?} queued {} samples", root, found.len());
    found.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_matcher_uses_file_name_and_skips_crops() {
        let matcher = ArtifactMatcher::new("*.jpg").unwrap();
        assert!(matcher.matches(Path::new("/data/a/capture.jpg")));
        assert!(!matcher.matches(Path::new("/data/a/capture.png")));
        assert!(!matcher.matches(Path::new("/data/a/labels_textarea_1.jpg")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ArtifactMatcher::new("[unclosed").is_err());
    }

    #[test]
    fn test_recursive_backlog() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("day1").join("dc1.x");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join("top.jpg"), b"").unwrap();
        fs::write(nested.join("labels.jpg"), b"").unwrap();
        fs::write(nested.join("labels_textarea_1.jpg"), b"").unwrap();
        fs::write(nested.join("notes.txt"), b"").unwrap();

        let queue = WorkQueue::new();
        let matcher = ArtifactMatcher::new("*.jpg").unwrap();
        assert_eq!(enqueue_backlog(root.path(), &matcher, &queue), 2);

        let found = scan(root.path(), &matcher);
        assert_eq!(found, vec![nested.join("labels.jpg"), root.path().join("top.jpg")]);
    }
}
