//! Caller-side alert coordination.
//!
//! The countdown never schedules notifications itself. Hosts feed its events
//! into an [`AlertCoordinator`], which keeps exactly one pending alert in
//! step with the countdown: scheduled while running, cancelled while paused,
//! stopped or reset. Alert failures are logged and dropped so they can never
//! hold up a countdown transition.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AlertError;
use crate::events::Event;

/// The content of a countdown alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
}

impl Default for Alert {
    fn default() -> Self {
        Self {
            title: "Timer finished".into(),
            body: "Your countdown is done.".into(),
        }
    }
}

/// Platform notification facility (local notifications, push, a terminal).
pub trait AlertScheduler {
    /// Deliver `alert` in `after_secs` seconds, replacing any pending alert.
    fn schedule(&mut self, after_secs: u64, alert: &Alert) -> Result<(), AlertError>;

    /// Drop the pending alert, if any.
    fn cancel(&mut self) -> Result<(), AlertError>;

    /// Called when the countdown reached zero while this host was watching.
    fn fire_now(&mut self, alert: &Alert) -> Result<(), AlertError> {
        self.schedule(0, alert)
    }
}

/// Drives an [`AlertScheduler`] from countdown events.
#[derive(Debug)]
pub struct AlertCoordinator<A> {
    scheduler: A,
    alert: Alert,
    enabled: bool,
    pending: bool,
}

impl<A: AlertScheduler> AlertCoordinator<A> {
    pub fn new(scheduler: A, alert: Alert) -> Self {
        Self {
            scheduler,
            alert,
            enabled: true,
            pending: false,
        }
    }

    /// Disabled coordinators still cancel what they scheduled before.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn scheduler(&self) -> &A {
        &self.scheduler
    }

    /// Whether an alert is believed to be scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Schedule the alert for a countdown this host picked up mid-run.
    pub fn arm(&mut self, after_secs: u64) {
        self.reschedule(after_secs);
    }

    /// Deliver the alert immediately, for hosts that watched the countdown
    /// reach zero themselves.
    pub fn fire_now(&mut self) {
        self.pending = false;
        if !self.enabled {
            return;
        }
        if let Err(e) = self.scheduler.fire_now(&self.alert) {
            warn!("failed to deliver alert: {e}");
        }
    }

    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::CountdownStarted { duration_secs, .. } => self.reschedule(*duration_secs),
            Event::CountdownResumed { seconds_left, .. } => self.reschedule(*seconds_left),
            Event::CountdownPaused { .. }
            | Event::CountdownStopped { .. }
            | Event::CountdownReset { .. } => self.cancel(),
            Event::CountdownCompleted { .. } => {
                // The scheduled alert covers delivery; only track that it is gone.
                self.pending = false;
                info!(title = %self.alert.title, "countdown alert due");
            }
            Event::StateSnapshot { .. } => {}
        }
    }

    fn reschedule(&mut self, after_secs: u64) {
        self.cancel();
        if !self.enabled {
            return;
        }
        match self.scheduler.schedule(after_secs, &self.alert) {
            Ok(()) => {
                debug!(after_secs, "alert scheduled");
                self.pending = true;
            }
            Err(e) => warn!("failed to schedule alert: {e}"),
        }
    }

    /// Drop the pending alert, for hosts that learn of a change without an
    /// event (another process paused or stopped the countdown).
    pub fn cancel(&mut self) {
        if !self.pending {
            return;
        }
        match self.scheduler.cancel() {
            Ok(()) => debug!("alert cancelled"),
            Err(e) => warn!("failed to cancel alert: {e}"),
        }
        self.pending = false;
    }
}

/// Alert scheduler for terminal hosts.
///
/// It cannot deliver anything while the process is gone, so it only reports
/// what would be scheduled and rings the terminal bell on `fire_now`.
#[derive(Debug, Clone, Default)]
pub struct LogAlertScheduler {
    bell: bool,
    scheduled: Option<u64>,
}

impl LogAlertScheduler {
    pub fn new(bell: bool) -> Self {
        Self {
            bell,
            scheduled: None,
        }
    }

    /// Seconds until the pending alert, as of when it was scheduled.
    pub fn scheduled(&self) -> Option<u64> {
        self.scheduled
    }
}

impl AlertScheduler for LogAlertScheduler {
    fn schedule(&mut self, after_secs: u64, alert: &Alert) -> Result<(), AlertError> {
        info!(after_secs, title = %alert.title, "alert scheduled");
        self.scheduled = Some(after_secs);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), AlertError> {
        if self.scheduled.take().is_some() {
            info!("alert cancelled");
        }
        Ok(())
    }

    fn fire_now(&mut self, alert: &Alert) -> Result<(), AlertError> {
        self.scheduled = None;
        let mut stderr = std::io::stderr().lock();
        let bell = if self.bell { "\x07" } else { "" };
        writeln!(stderr, "{bell}{}: {}", alert.title, alert.body).map_err(|e| {
            AlertError::ScheduleFailed {
                after_secs: 0,
                message: e.to_string(),
            }
        })
    }
}
