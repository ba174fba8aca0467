//! Anchored countdown implementation.
//!
//! The countdown is a wall-clock-anchored state machine. Starting it fixes an
//! absolute end instant; every read of the remaining time is recomputed as
//! `ceil((end - now) / 1000)`. Nothing is ever decremented, so late or
//! missing ticks cannot introduce drift.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running -> Done
//!           |          |
//!           +-> Stopped <+        (stop/reset accepted from any state)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut countdown = Countdown::new(600, SystemClock, ticker);
//! countdown.start(None);
//! // Every ticker period, and on every foreground transition:
//! countdown.recompute(); // Returns Some(Event) when the countdown completes
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::snapshot::CountdownSnapshot;
use super::status::{CountdownStatus, CountdownView};
use super::ticker::Ticker;
use crate::clock::{datetime_from_ms, Clock};
use crate::events::Event;

/// Recompute period used when the host does not configure one.
pub const DEFAULT_RECOMPUTE_INTERVAL: Duration = Duration::from_millis(250);

/// Core countdown state machine.
///
/// Commands are total: a command that does not apply to the current status
/// is a no-op and returns `None`.
#[derive(Debug)]
pub struct Countdown<C, T> {
    clock: C,
    ticker: T,
    interval: Duration,
    seconds_left: u64,
    status: CountdownStatus,
    /// Epoch milliseconds at which the countdown reaches zero.
    /// `Some` if and only if `status == Running`.
    end_epoch_ms: Option<u64>,
    initial_seconds: u64,
}

impl<C: Clock, T: Ticker> Countdown<C, T> {
    /// Create an idle countdown showing `initial_seconds`.
    pub fn new(initial_seconds: u64, clock: C, ticker: T) -> Self {
        Self {
            clock,
            ticker,
            interval: DEFAULT_RECOMPUTE_INTERVAL,
            seconds_left: initial_seconds,
            status: CountdownStatus::Idle,
            end_epoch_ms: None,
            initial_seconds,
        }
    }

    /// Override the recompute period. Zero is replaced by the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            DEFAULT_RECOMPUTE_INTERVAL
        } else {
            interval
        };
        if self.ticker.is_armed() {
            self.ticker.arm(self.interval);
        }
        self
    }

    /// Rebuild a countdown from a persisted snapshot.
    ///
    /// A running snapshot keeps its original end instant and re-arms the
    /// ticker; call [`recompute`](Self::recompute) afterwards to catch up with
    /// time that passed while nothing was hosting the countdown. Snapshots
    /// that break the anchor invariant are repaired: running without an end
    /// instant becomes paused, and an end instant outside running is dropped.
    pub fn restore(snapshot: &CountdownSnapshot, clock: C, ticker: T) -> Self {
        let mut countdown = Self::new(snapshot.initial_seconds, clock, ticker);
        countdown.seconds_left = snapshot.seconds_left;
        countdown.status = snapshot.status;

        match (snapshot.status, snapshot.end_epoch_ms) {
            (CountdownStatus::Running, Some(end)) => {
                countdown.end_epoch_ms = Some(end);
                countdown.ticker.arm(countdown.interval);
            }
            (CountdownStatus::Running, None) => {
                debug!("running snapshot without end instant, restoring as paused");
                countdown.status = CountdownStatus::Paused;
            }
            _ => {}
        }
        countdown
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> CountdownStatus {
        self.status
    }

    pub fn seconds_left(&self) -> u64 {
        self.seconds_left
    }

    pub fn initial_seconds(&self) -> u64 {
        self.initial_seconds
    }

    pub fn end_epoch_ms(&self) -> Option<u64> {
        self.end_epoch_ms
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.end_epoch_ms.map(datetime_from_ms)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ticker(&self) -> &T {
        &self.ticker
    }

    /// Mutable access for hosts that drive the ticker themselves.
    pub fn ticker_mut(&mut self) -> &mut T {
        &mut self.ticker
    }

    pub fn view(&self) -> CountdownView {
        CountdownView {
            seconds_left: self.seconds_left,
            status: self.status,
        }
    }

    pub fn snapshot(&self) -> CountdownSnapshot {
        CountdownSnapshot {
            seconds_left: self.seconds_left,
            status: self.status,
            initial_seconds: self.initial_seconds,
            end_epoch_ms: self.end_epoch_ms,
            saved_at: self.clock.now(),
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot_event(&self) -> Event {
        Event::StateSnapshot {
            status: self.status,
            seconds_left: self.seconds_left,
            initial_seconds: self.initial_seconds,
            ends_at: self.ends_at(),
            at: self.clock.now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start from `idle`, `stopped` or `done`.
    ///
    /// Without an explicit duration the countdown continues from the frozen
    /// `seconds_left` if positive, else from `initial_seconds`. An explicit
    /// duration also becomes the new `initial_seconds`.
    pub fn start(&mut self, seconds: Option<u64>) -> Option<Event> {
        if !self.status.can_start() {
            return None;
        }
        let duration = match seconds {
            Some(s) => s,
            None if self.seconds_left > 0 => self.seconds_left,
            None => self.initial_seconds,
        };
        if duration == 0 {
            return None;
        }
        if seconds.is_some() {
            self.initial_seconds = duration;
        }

        let now = self.clock.now_ms();
        let end = now.saturating_add(duration.saturating_mul(1000));
        self.end_epoch_ms = Some(end);
        self.seconds_left = duration;
        self.status = CountdownStatus::Running;
        self.ticker.arm(self.interval);
        debug!(duration_secs = duration, end_epoch_ms = end, "countdown started");

        Some(Event::CountdownStarted {
            duration_secs: duration,
            ends_at: datetime_from_ms(end),
            at: datetime_from_ms(now),
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.status != CountdownStatus::Running {
            return None;
        }
        // Freeze the value as of now; the countdown may have run out already.
        if let Some(done) = self.recompute() {
            return Some(done);
        }
        self.halt(CountdownStatus::Paused);
        debug!(seconds_left = self.seconds_left, "countdown paused");
        Some(Event::CountdownPaused {
            seconds_left: self.seconds_left,
            at: self.clock.now(),
        })
    }

    pub fn resume(&mut self) -> Option<Event> {
        if self.status != CountdownStatus::Paused || self.seconds_left == 0 {
            return None;
        }
        let now = self.clock.now_ms();
        let end = now.saturating_add(self.seconds_left.saturating_mul(1000));
        self.end_epoch_ms = Some(end);
        self.status = CountdownStatus::Running;
        self.ticker.arm(self.interval);
        debug!(seconds_left = self.seconds_left, "countdown resumed");
        Some(Event::CountdownResumed {
            seconds_left: self.seconds_left,
            ends_at: datetime_from_ms(end),
            at: datetime_from_ms(now),
        })
    }

    /// Stop from any state. Returns `None` if already stopped.
    pub fn stop(&mut self) -> Option<Event> {
        if self.status == CountdownStatus::Stopped {
            return None;
        }
        if self.end_epoch_ms.is_some() {
            self.refresh_seconds_left();
        }
        self.halt(CountdownStatus::Stopped);
        debug!(seconds_left = self.seconds_left, "countdown stopped");
        Some(Event::CountdownStopped {
            seconds_left: self.seconds_left,
            at: self.clock.now(),
        })
    }

    /// Return to `idle` showing `seconds`, from any state.
    pub fn reset(&mut self, seconds: u64) -> Option<Event> {
        self.halt(CountdownStatus::Idle);
        self.seconds_left = seconds;
        self.initial_seconds = seconds;
        debug!(seconds, "countdown reset");
        Some(Event::CountdownReset {
            seconds,
            at: self.clock.now(),
        })
    }

    /// Derive `seconds_left` from the anchor.
    ///
    /// Returns `Some(Event::CountdownCompleted)` on the recompute that reaches
    /// zero. Without an anchor (any status but running) this is a no-op, so a
    /// tick delivered after a stop cannot touch the state.
    pub fn recompute(&mut self) -> Option<Event> {
        let ms_left = self.refresh_seconds_left()?;
        if ms_left > 0 {
            return None;
        }
        self.halt(CountdownStatus::Done);
        self.seconds_left = 0;
        debug!(initial_seconds = self.initial_seconds, "countdown completed");
        Some(Event::CountdownCompleted {
            initial_seconds: self.initial_seconds,
            at: self.clock.now(),
        })
    }

    /// The host returned to the foreground: catch up immediately instead of
    /// waiting for the next tick.
    pub fn on_foreground(&mut self) -> Option<Event> {
        match self.status {
            CountdownStatus::Running | CountdownStatus::Paused => self.recompute(),
            _ => None,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Update `seconds_left` from the anchor without changing status.
    /// Returns the milliseconds left, or `None` when not anchored.
    fn refresh_seconds_left(&mut self) -> Option<u64> {
        let end = self.end_epoch_ms?;
        let ms_left = end.saturating_sub(self.clock.now_ms());
        self.seconds_left = ms_left.div_ceil(1000);
        Some(ms_left)
    }

    fn halt(&mut self, status: CountdownStatus) {
        self.ticker.disarm();
        self.end_epoch_ms = None;
        self.status = status;
    }
}
