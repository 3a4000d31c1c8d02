//! Ingestion
//!
//! Finds sample artifacts (backlog scan at startup, live filesystem events
//! afterwards) and feeds them to the workers through one unbounded FIFO.

pub mod scanner;
pub mod watcher;

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;

/// Substring marking derived text-area crops; such files are never samples
pub const TEXT_AREA_MARKER: &str = "_textarea_";

/// One unit of work for a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Path of a detected sample artifact
    Sample(PathBuf),
    /// Ask the worker that receives it to exit
    Shutdown,
}

/// Multi-producer, multi-consumer work queue
#[derive(Clone)]
pub struct WorkQueue {
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueue a sample path; never blocks
    pub fn push(&self, path: PathBuf) {
        // Both ends live in self, so the channel cannot be disconnected
        let _ = self.tx.send(WorkItem::Sample(path));
    }

    /// Enqueue one shutdown sentinel
    pub fn push_shutdown(&self) {
        let _ = self.tx.send(WorkItem::Shutdown);
    }

    /// Block until the next item arrives
    pub fn pop(&self) -> WorkItem {
        self.rx.recv().unwrap_or(WorkItem::Shutdown)
    }

    /// Items waiting in the queue
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new();
        queue.push(PathBuf::from("a"));
        queue.push(PathBuf::from("b"));
        queue.push_shutdown();
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), WorkItem::Sample(PathBuf::from("a")));
        assert_eq!(queue.pop(), WorkItem::Sample(PathBuf::from("b")));
        assert_eq!(queue.pop(), WorkItem::Shutdown);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clones_share_one_queue() {
        let producer = WorkQueue::new();
        let consumer = producer.clone();
        producer.push(PathBuf::from("x"));
        assert_eq!(consumer.pop(), WorkItem::Sample(PathBuf::from("x")));
    }
}
