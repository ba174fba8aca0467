//! Host lifecycle capability.
//!
//! Hosts publish their application state on a [`LifecycleBus`]; a countdown
//! host subscribes and forwards foreground transitions to
//! `Countdown::on_foreground()`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// Visible and receiving input.
    Active,
    /// Visible but not focused (e.g. an overlay is shown).
    Inactive,
    /// Not visible; timers may be delayed or suspended.
    Background,
}

const BUS_CAPACITY: usize = 16;

/// Broadcasts application state changes to any number of subscribers.
#[derive(Debug, Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<AppState>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppState> {
        self.tx.subscribe()
    }

    /// Publish a state change. Returns how many subscribers received it.
    pub fn notify(&self, state: AppState) -> usize {
        debug!(?state, "lifecycle transition");
        self.tx.send(state).unwrap_or(0)
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a stream of [`AppState`] values into foreground transitions.
///
/// Only a return to `Active` after the host went to `Background` counts;
/// `Active -> Inactive -> Active` (an overlay, a system dialog) does not, as
/// timers keep running while the host is visible.
#[derive(Debug, Clone, Default)]
pub struct ForegroundWatch {
    backgrounded: bool,
}

impl ForegroundWatch {
    /// Hosts start in the foreground.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `next`; true when it brings the host back from the background.
    pub fn observe(&mut self, next: AppState) -> bool {
        match next {
            AppState::Background => {
                self.backgrounded = true;
                false
            }
            AppState::Inactive => false,
            AppState::Active => std::mem::take(&mut self.backgrounded),
        }
    }
}
