//! Idle timer driving heartbeat decisions.

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{Activity, Direction, IdleConfig, IdleEvent};

/// Reports read/write silence on one connection.
///
/// Poll [`next_idle`](Self::next_idle) from the connection's own loop, or
/// hand the timer to [`spawn`](Self::spawn) to have a callback invoked.
/// Dropping the timer stops it.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct IdleTimer {
    config: IdleConfig,
    activity: Activity,
    interval: Interval,
    read_fired_at: Option<Instant>,
    write_fired_at: Option<Instant>,
}

impl IdleTimer {
    /// Creates a timer with a fresh activity clock.
    pub fn new(config: IdleConfig) -> Self {
        Self::with_activity(config, Activity::new())
    }

    /// Creates a timer that watches an existing activity clock.
    pub fn with_activity(config: IdleConfig, activity: Activity) -> Self {
        let mut interval = tokio::time::interval(config.effective_poll());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            config,
            activity,
            interval,
            read_fired_at: None,
            write_fired_at: None,
        }
    }

    /// Clock the connection should stamp on every read and write.
    pub fn activity(&self) -> Activity {
        self.activity.clone()
    }

    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    /// Waits for the next idle event.
    ///
    /// Never resolves when both directions are disabled. Cancel-safe: a
    /// dropped call loses no state.
    pub async fn next_idle(&mut self) -> IdleEvent {
        if self.config.is_disabled() {
            return std::future::pending().await;
        }

        loop {
            if let Some(event) = self.check(Instant::now()) {
                return event;
            }
            self.interval.tick().await;
        }
    }

    /// Runs the timer on its own task and invokes `on_idle` for every event.
    ///
    /// Invocations never overlap. Use [`IdleTimerGuard::cancel`] to stop the
    /// timer and wait until no invocation can happen any more.
    pub fn spawn<F>(mut self, mut on_idle: F) -> IdleTimerGuard
    where
        F: FnMut(IdleEvent) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    event = self.next_idle() => on_idle(event),
                }
            }
            trace!("idle timer stopped");
        });

        IdleTimerGuard {
            cancel,
            handle: Some(handle),
        }
    }

    /// Compares the clock with both thresholds and re-arms what fired.
    fn check(&mut self, now: Instant) -> Option<IdleEvent> {
        if let Some(threshold) = self.config.read_threshold() {
            let since = quiet_since(self.activity.last(Direction::Read), self.read_fired_at);
            if now.saturating_duration_since(since) >= threshold {
                self.read_fired_at = Some(now);
                trace!(?threshold, "reader idle");
                return Some(IdleEvent::ReaderIdle);
            }
        }

        if let Some(threshold) = self.config.write_threshold() {
            let since = quiet_since(self.activity.last(Direction::Write), self.write_fired_at);
            if now.saturating_duration_since(since) >= threshold {
                self.write_fired_at = Some(now);
                trace!(?threshold, "writer idle");
                return Some(IdleEvent::WriterIdle);
            }
        }

        None
    }
}

/// Start of the current idle period: the later of the last traffic and the
/// last firing.
fn quiet_since(last_traffic: Instant, fired_at: Option<Instant>) -> Instant {
    match fired_at {
        Some(fired) if fired > last_traffic => fired,
        _ => last_traffic,
    }
}

/// Handle to a timer started with [`IdleTimer::spawn`].
///
/// Dropping the guard stops the timer without waiting for it.
#[derive(Debug)]
pub struct IdleTimerGuard {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl IdleTimerGuard {
    /// Stops the timer and waits for its task to exit.
    ///
    /// Once this returns the callback will not be invoked again.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for IdleTimerGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(1);
    const POLL: Duration = Duration::from_millis(100);

    fn writer_timer() -> IdleTimer {
        IdleTimer::new(IdleConfig::writer(THRESHOLD).with_poll_granularity(POLL))
    }

    #[tokio::test(start_paused = true)]
    async fn write_idle_fires_within_window() {
        let start = Instant::now();
        let mut timer = writer_timer();

        let event = timer.next_idle().await;
        let elapsed = start.elapsed();

        assert_eq!(event, IdleEvent::WriterIdle);
        assert!(elapsed >= THRESHOLD, "fired early: {elapsed:?}");
        assert!(elapsed <= THRESHOLD + POLL, "fired late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn silence_fires_once_per_period() {
        let start = Instant::now();
        let mut timer = writer_timer();

        timer.next_idle().await;
        let second = timer.next_idle().await;
        let elapsed = start.elapsed();

        assert_eq!(second, IdleEvent::WriterIdle);
        assert!(elapsed >= THRESHOLD * 2, "re-armed too soon: {elapsed:?}");
        assert!(elapsed <= THRESHOLD * 2 + POLL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_postpones_firing() {
        let start = Instant::now();
        let mut timer = writer_timer();
        let activity = timer.activity();

        tokio::time::advance(Duration::from_millis(600)).await;
        activity.record(Direction::Write);

        timer.next_idle().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1600), "ignored activity: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1600) + POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn unmonitored_direction_is_ignored() {
        let mut timer = IdleTimer::new(IdleConfig::reader(THRESHOLD).with_poll_granularity(POLL));
        let activity = timer.activity();

        // Reads keep flowing; silence on the write side must not matter.
        let feeder = tokio::spawn(async move {
            for _ in 0..30 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                activity.record(Direction::Read);
            }
        });

        let result = tokio::time::timeout(Duration::from_secs(5), timer.next_idle()).await;
        assert!(result.is_err(), "fired despite steady reads: {result:?}");
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_timer_never_fires() {
        let mut timer = IdleTimer::new(IdleConfig::default());
        let result = tokio::time::timeout(Duration::from_secs(3600), timer.next_idle()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn both_directions_report_independently() {
        let config = IdleConfig {
            read_idle: Some(Duration::from_secs(1)),
            write_idle: Some(Duration::from_secs(2)),
            poll_granularity: POLL,
        };
        let mut timer = IdleTimer::new(config);

        assert_eq!(timer.next_idle().await, IdleEvent::ReaderIdle);
        // At two seconds both are due; the reader is checked first.
        assert_eq!(timer.next_idle().await, IdleEvent::ReaderIdle);
        assert_eq!(timer.next_idle().await, IdleEvent::WriterIdle);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_callback_repeats_until_cancelled() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();

        let guard = writer_timer().spawn(move |event| {
            sink.lock().unwrap().push(event);
        });

        tokio::time::sleep(Duration::from_millis(3050)).await;
        guard.cancel().await;
        let count = fired.lock().unwrap().len();
        assert_eq!(count, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.lock().unwrap().len(), count, "fired after cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_stops_timer() {
        let fired = Arc::new(Mutex::new(0u32));
        let sink = fired.clone();

        let guard = writer_timer().spawn(move |_| {
            *sink.lock().unwrap() += 1;
        });
        drop(guard);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*fired.lock().unwrap(), 0);
    }
}
