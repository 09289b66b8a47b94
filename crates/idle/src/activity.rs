//! Shared last-traffic clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::Direction;

/// Last-read and last-write timestamps for one connection.
///
/// Cloneable and lock-free. The read path and the write pump each hold a
/// clone and stamp their own direction; the idle timer only reads.
#[derive(Debug, Clone)]
pub struct Activity {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    origin: Instant,
    // Nanoseconds since `origin`.
    last_read: AtomicU64,
    last_write: AtomicU64,
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity {
    /// Starts a clock with both directions stamped now.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                origin: Instant::now(),
                last_read: AtomicU64::new(0),
                last_write: AtomicU64::new(0),
            }),
        }
    }

    /// Stamps traffic on `direction` at the current time.
    pub fn record(&self, direction: Direction) {
        let offset = self.offset(Instant::now());
        // fetch_max keeps the stamp monotonic when two tasks race.
        self.slot(direction).fetch_max(offset, Ordering::AcqRel);
    }

    /// Time of the last traffic on `direction`.
    pub fn last(&self, direction: Direction) -> Instant {
        let nanos = self.slot(direction).load(Ordering::Acquire);
        self.inner.origin + Duration::from_nanos(nanos)
    }

    fn slot(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::Read => &self.inner.last_read,
            Direction::Write => &self.inner.last_write,
        }
    }

    fn offset(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.inner.origin);
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }
}
