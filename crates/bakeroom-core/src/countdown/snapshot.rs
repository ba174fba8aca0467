use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::CountdownStatus;

/// Persisted form of a countdown, for crash/restart recovery and for hosts
/// (like the CLI) that live shorter than the countdown they drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownSnapshot {
    pub seconds_left: u64,
    pub status: CountdownStatus,
    pub initial_seconds: u64,
    /// End instant in epoch milliseconds; only present while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_epoch_ms: Option<u64>,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::countdown::{Countdown, ManualTicker, Ticker};

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn running_snapshot_keeps_anchor() {
        let clock = ManualClock::new(T0);
        let mut cd = Countdown::new(120, clock.clone(), ManualTicker::new());
        cd.start(None);
        clock.advance_ms(20_000);
        cd.recompute();
        let snap = cd.snapshot();
        assert_eq!(snap.end_epoch_ms, Some(T0 + 120_000));
        assert_eq!(snap.seconds_left, 100);

        // Nobody hosts the countdown for 30 seconds.
        clock.advance_ms(30_000);
        let mut restored = Countdown::restore(&snap, clock.clone(), ManualTicker::new());
        assert!(restored.ticker().is_armed());
        assert_eq!(restored.seconds_left(), 100);
        restored.recompute();
        assert_eq!(restored.seconds_left(), 70);
        assert_eq!(restored.status(), CountdownStatus::Running);
    }

    #[test]
    fn expired_snapshot_completes_on_first_recompute() {
        let clock = ManualClock::new(T0);
        let mut cd = Countdown::new(10, clock.clone(), ManualTicker::new());
        cd.start(None);
        let snap = cd.snapshot();

        clock.advance_ms(3_600_000);
        let mut restored = Countdown::restore(&snap, clock, ManualTicker::new());
        assert!(restored.recompute().is_some());
        assert_eq!(restored.status(), CountdownStatus::Done);
        assert_eq!(restored.seconds_left(), 0);
    }

    #[test]
    fn running_without_anchor_restores_paused() {
        let snap = CountdownSnapshot {
            seconds_left: 42,
            status: CountdownStatus::Running,
            initial_seconds: 60,
            end_epoch_ms: None,
            saved_at: Utc::now(),
        };
        let restored = Countdown::restore(&snap, ManualClock::new(T0), ManualTicker::new());
        assert_eq!(restored.status(), CountdownStatus::Paused);
        assert_eq!(restored.seconds_left(), 42);
        assert!(!restored.ticker().is_armed());
    }

    #[test]
    fn stray_anchor_outside_running_is_dropped() {
        let snap = CountdownSnapshot {
            seconds_left: 5,
            status: CountdownStatus::Stopped,
            initial_seconds: 60,
            end_epoch_ms: Some(T0 + 5_000),
            saved_at: Utc::now(),
        };
        let restored = Countdown::restore(&snap, ManualClock::new(T0), ManualTicker::new());
        assert_eq!(restored.end_epoch_ms(), None);
        assert_eq!(restored.status(), CountdownStatus::Stopped);
    }

    #[test]
    fn snapshot_json_omits_missing_anchor() {
        let snap = CountdownSnapshot {
            seconds_left: 5,
            status: CountdownStatus::Idle,
            initial_seconds: 5,
            end_epoch_ms: None,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("end_epoch_ms").is_none());
        assert_eq!(json["status"], "idle");
    }
}
