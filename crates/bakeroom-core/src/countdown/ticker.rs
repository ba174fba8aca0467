//! Periodic recompute capability.
//!
//! A [`Ticker`] is armed while a countdown is running and disarmed in every
//! other state. Whoever owns the ticker is responsible for calling
//! `Countdown::recompute()` each period; the countdown only decides when
//! ticks are wanted.

use std::time::Duration;

pub trait Ticker {
    /// Begin (or restart) periodic delivery every `period`.
    fn arm(&mut self, period: Duration);

    /// Stop periodic delivery. Must take effect before returning.
    fn disarm(&mut self);

    fn is_armed(&self) -> bool;
}

/// Ticker that only records whether it is armed.
///
/// Used by tests and by one-shot hosts (the CLI) that recompute by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    period: Option<Duration>,
    arm_count: usize,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// How many times `arm` has been called.
    pub fn arm_count(&self) -> usize {
        self.arm_count
    }
}

impl Ticker for ManualTicker {
    fn arm(&mut self, period: Duration) {
        self.period = Some(period);
        self.arm_count += 1;
    }

    fn disarm(&mut self) {
        self.period = None;
    }

    fn is_armed(&self) -> bool {
        self.period.is_some()
    }
}

impl<T: Ticker + ?Sized> Ticker for Box<T> {
    fn arm(&mut self, period: Duration) {
        (**self).arm(period)
    }

    fn disarm(&mut self) {
        (**self).disarm()
    }

    fn is_armed(&self) -> bool {
        (**self).is_armed()
    }
}
