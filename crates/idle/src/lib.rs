//! Idle detection for long-lived connections.
//!
//! An [`IdleTimer`] watches the read and write sides of one connection and
//! reports when either has been silent for longer than its threshold. The
//! connection's tasks stamp traffic through a shared [`Activity`] clock.
//!
//! Each idle period is reported once. If the link stays silent, the next
//! report comes one full threshold later, so a dead peer produces a steady
//! stream of events rather than a single one.

mod activity;
mod timer;

pub use activity::Activity;
pub use timer::{IdleTimer, IdleTimerGuard};

use std::time::Duration;

/// How often timers compare the clock against their thresholds.
pub const DEFAULT_POLL_GRANULARITY: Duration = Duration::from_millis(100);

/// Lower bound for the poll granularity.
const MIN_POLL_GRANULARITY: Duration = Duration::from_millis(1);

/// Side of the connection that saw traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Reported when a monitored direction has been silent for its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    ReaderIdle,
    WriterIdle,
}

/// Thresholds for one connection.
///
/// `None` or a zero duration leaves that direction unmonitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    pub read_idle: Option<Duration>,
    pub write_idle: Option<Duration>,
    pub poll_granularity: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            read_idle: None,
            write_idle: None,
            poll_granularity: DEFAULT_POLL_GRANULARITY,
        }
    }
}

impl IdleConfig {
    /// Monitors only the read side.
    pub fn reader(threshold: Duration) -> Self {
        Self {
            read_idle: Some(threshold),
            ..Self::default()
        }
    }

    /// Monitors only the write side.
    pub fn writer(threshold: Duration) -> Self {
        Self {
            write_idle: Some(threshold),
            ..Self::default()
        }
    }

    pub fn with_poll_granularity(mut self, poll_granularity: Duration) -> Self {
        self.poll_granularity = poll_granularity;
        self
    }

    /// Effective read threshold after normalising zero to disabled.
    pub fn read_threshold(&self) -> Option<Duration> {
        self.read_idle.filter(|d| !d.is_zero())
    }

    /// Effective write threshold after normalising zero to disabled.
    pub fn write_threshold(&self) -> Option<Duration> {
        self.write_idle.filter(|d| !d.is_zero())
    }

    /// Returns `true` if neither direction is monitored.
    pub fn is_disabled(&self) -> bool {
        self.read_threshold().is_none() && self.write_threshold().is_none()
    }

    fn effective_poll(&self) -> Duration {
        self.poll_granularity.max(MIN_POLL_GRANULARITY)
    }
}
