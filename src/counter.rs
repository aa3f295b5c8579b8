//! Process-wide message counter shared by every connection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Total number of messages received by the server.
///
/// One instance is created at startup and handed to each session behind an
/// `Arc`. Every increment is a single `fetch_add`, so concurrent callers each
/// observe a distinct value and none is lost.
#[derive(Debug, Default)]
pub struct MessageCounter {
    total: AtomicU64,
}

impl MessageCounter {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
        }
    }

    /// Add one message and return the new total.
    ///
    /// N calls across any number of threads return exactly `1..=N`.
    pub fn increment_and_get(&self) -> u64 {
        self.total.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current total, for logging
    pub fn current(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}
