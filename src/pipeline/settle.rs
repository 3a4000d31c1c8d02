//! Waiting for a freshly detected artifact to finish landing on disk

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// Size stopped changing
    Ready,
    /// Path no longer exists
    Gone,
    /// Still growing when the maximum wait ran out
    StillChanging,
}

fn size_of(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Sleep `initial`, then poll the size until two readings agree or
/// `max_wait` has passed. At least one poll is always made.
pub fn wait_until_settled(path: &Path, initial: Duration, max_wait: Duration) -> Settle {
    wait_with_interval(path, initial, max_wait, POLL_INTERVAL)
}

fn wait_with_interval(path: &Path, initial: Duration, max_wait: Duration, interval: Duration) -> Settle {
    if !initial.is_zero() {
        thread::sleep(initial);
    }
    let Some(mut previous) = size_of(path) else {
        return Settle::Gone;
    };

    let deadline = Instant::now().checked_add(max_wait);
    loop {
        thread::sleep(interval);
        match size_of(path) {
            None => return Settle::Gone,
            Some(size) if size == previous => return Settle::Ready,
            Some(size) => previous = size,
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Settle::StillChanging;
        }
    }
}
