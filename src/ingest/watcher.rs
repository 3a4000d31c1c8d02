//! Live directory watcher
//!
//! Subscribes to creation events under the data root and queues matching
//! artifacts. Some platforms report a single file write as several
//! creation events, so a path equal to the one queued just before it is
//! dropped.

use anyhow::{Context, Result};
use notify::event::{Event, EventKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::scanner::ArtifactMatcher;
use super::WorkQueue;

/// Suppresses immediate repeats of the last admitted path
#[derive(Debug, Default)]
pub struct Debouncer {
    last: Option<PathBuf>,
}

impl Debouncer {
    pub fn admit(&mut self, path: &Path) -> bool {
        if self.last.as_deref() == Some(path) {
            return false;
        }
        self.last = Some(path.to_path_buf());
        true
    }
}

/// Turns raw filesystem events into queue entries
pub struct EventFilter {
    matcher: ArtifactMatcher,
    debouncer: Debouncer,
}

impl EventFilter {
    pub fn new(matcher: ArtifactMatcher) -> Self {
        Self {
            matcher,
            debouncer: Debouncer::default(),
        }
    }

    /// Paths of `event` that should be queued
    pub fn admit(&mut self, event: &Event) -> Vec<PathBuf> {
        if !matches!(event.kind, EventKind::Create(_)) {
            return Vec::new();
        }
        let mut admitted = Vec::new();
        for path in &event.paths {
            if !self.matcher.matches(path) {
                continue;
            }
            if self.debouncer.admit(path) {
                admitted.push(path.clone());
            } else {
                debug!("Duplicate creation event for {:?} ignored", path);
            }
        }
        admitted
    }
}

/// Running watcher; dropping it stops event delivery
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl DirectoryWatcher {
    /// Start watching `root` recursively, pushing admitted paths to `queue`
    pub fn start(root: &Path, matcher: ArtifactMatcher, queue: WorkQueue) -> Result<Self> {
        let mut filter = EventFilter::new(matcher);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in filter.admit(&event) {
                    info!("New sample detected: {:?}", path);
                    queue.push(path);
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        })
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", root))?;
        info!("Watching {:?} for new samples", root);

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    fn create_event(path: &str) -> Event {
        Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from(path))
    }

    fn filter() -> EventFilter {
        EventFilter::new(ArtifactMatcher::new("*.jpg").unwrap())
    }

    #[test]
    fn test_repeated_creation_is_queued_once() {
        let mut filter = filter();
        let queue = WorkQueue::new();
        for _ in 0..2 {
            for path in filter.admit(&create_event("/data/s1/labels.jpg")) {
                queue.push(path);
            }
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_only_immediate_repeats_are_suppressed() {
        let mut filter = filter();
        assert_eq!(filter.admit(&create_event("/data/a.jpg")).len(), 1);
        assert_eq!(filter.admit(&create_event("/data/b.jpg")).len(), 1);
        assert_eq!(filter.admit(&create_event("/data/a.jpg")).len(), 1);
    }

    #[test]
    fn test_non_creation_and_non_matching_events_are_ignored() {
        let mut filter = filter();
        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/data/a.jpg"));
        assert!(filter.admit(&modify).is_empty());
        assert!(filter.admit(&create_event("/data/a.txt")).is_empty());
        assert!(filter.admit(&create_event("/data/a_textarea_1.jpg")).is_empty());
    }

    #[test]
    fn test_live_watch_queues_new_file() {
        let root = tempfile::TempDir::new().unwrap();
        let queue = WorkQueue::new();
        let _watcher =
            DirectoryWatcher::start(root.path(), ArtifactMatcher::new("*.jpg").unwrap(), queue.clone()).unwrap();

        let path = root.path().join("capture.jpg");
        std::fs::write(&path, b"jpg").unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while queue.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!queue.is_empty());
    }
}
