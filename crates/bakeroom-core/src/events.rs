use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::countdown::CountdownStatus;

/// Every state change of a countdown produces an Event.
/// Front ends render them; the alert coordinator and storage react to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    CountdownStarted {
        duration_secs: u64,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    CountdownPaused {
        seconds_left: u64,
        at: DateTime<Utc>,
    },
    CountdownResumed {
        seconds_left: u64,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    CountdownStopped {
        seconds_left: u64,
        at: DateTime<Utc>,
    },
    CountdownReset {
        seconds: u64,
        at: DateTime<Utc>,
    },
    /// Remaining time reached zero.
    CountdownCompleted {
        initial_seconds: u64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: CountdownStatus,
        seconds_left: u64,
        initial_seconds: u64,
        ends_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// When the countdown reached zero, for completion events.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Event::CountdownCompleted { at, .. } => Some(*at),
            _ => None,
        }
    }
}
