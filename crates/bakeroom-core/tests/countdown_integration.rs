//! Integration tests for the anchored countdown.
//!
//! Walks the public API the way a host does: injected clock and ticker,
//! events into alerts and storage, snapshots across host restarts.

use std::time::Duration;

use bakeroom_core::{
    Alert, AlertCoordinator, AlertError, AlertScheduler, Countdown, CountdownStatus, Database,
    Event, ManualClock, ManualTicker, Ticker,
};
use proptest::prelude::*;

const T0: u64 = 1_750_000_000_000;

fn countdown(secs: u64) -> (Countdown<ManualClock, ManualTicker>, ManualClock) {
    let clock = ManualClock::new(T0);
    (Countdown::new(secs, clock.clone(), ManualTicker::new()), clock)
}

#[test]
fn pause_and_resume_split_the_run_without_drift() {
    let (mut cd, clock) = countdown(10);
    cd.start(None);

    clock.advance(Duration::from_secs(3));
    cd.pause();
    assert_eq!(cd.seconds_left(), 7);

    clock.advance(Duration::from_secs(45));
    assert_eq!(cd.seconds_left(), 7);

    cd.resume();
    clock.advance(Duration::from_secs(7));
    let event = cd.recompute();
    assert!(matches!(event, Some(Event::CountdownCompleted { .. })));
    assert_eq!(cd.status(), CountdownStatus::Done);
    assert_eq!(cd.seconds_left(), 0);
}

#[test]
fn stop_from_any_state_then_restart() {
    let (mut cd, clock) = countdown(60);
    assert!(cd.stop().is_some());
    assert_eq!(cd.status(), CountdownStatus::Stopped);

    cd.start(None);
    clock.advance(Duration::from_secs(10));
    cd.pause();
    cd.stop();
    assert_eq!(cd.status(), CountdownStatus::Stopped);

    clock.advance(Duration::from_secs(100));
    cd.start(None);
    assert_eq!(cd.end_epoch_ms(), Some(T0 + 110_000 + 50_000));
}

#[test]
fn ticker_is_armed_exactly_while_running() {
    let (mut cd, clock) = countdown(5);
    assert!(!cd.ticker().is_armed());
    cd.start(None);
    assert!(cd.ticker().is_armed());
    cd.pause();
    assert!(!cd.ticker().is_armed());
    cd.resume();
    assert!(cd.ticker().is_armed());
    clock.advance(Duration::from_secs(5));
    cd.recompute();
    assert!(!cd.ticker().is_armed());
    assert_eq!(cd.ticker().arm_count(), 2);
}

#[test]
fn snapshot_survives_host_restart_through_database() {
    let db = Database::open_memory().unwrap();
    let clock = ManualClock::new(T0);

    {
        let mut cd = Countdown::new(300, clock.clone(), ManualTicker::new());
        cd.start(None);
        db.save_snapshot(&cd.snapshot()).unwrap();
    }

    clock.advance(Duration::from_secs(120));
    let snapshot = db.load_snapshot().unwrap().unwrap();
    let mut cd = Countdown::restore(&snapshot, clock.clone(), ManualTicker::new());
    cd.recompute();
    assert_eq!(cd.status(), CountdownStatus::Running);
    assert_eq!(cd.seconds_left(), 180);

    clock.advance(Duration::from_secs(200));
    if let Some(Event::CountdownCompleted {
        initial_seconds,
        at,
    }) = cd.recompute()
    {
        db.record_completion(initial_seconds, at).unwrap();
    }
    let history = db.recent_completions(5).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].duration_secs, 300);
}

#[derive(Default)]
struct Pending(Option<u64>);

impl AlertScheduler for Pending {
    fn schedule(&mut self, after_secs: u64, _alert: &Alert) -> Result<(), AlertError> {
        self.0 = Some(after_secs);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), AlertError> {
        self.0 = None;
        Ok(())
    }
}

#[test]
fn alerts_follow_countdown_events() {
    let (mut cd, clock) = countdown(600);
    let mut alerts = AlertCoordinator::new(Pending::default(), Alert::default());

    let mut drive = |event: Option<Event>| {
        if let Some(event) = event {
            alerts.handle(&event);
        }
    };

    drive(cd.start(None));
    clock.advance(Duration::from_secs(100));
    drive(cd.pause());
    drive(cd.resume());
    drop(drive);
    assert_eq!(alerts.scheduler().0, Some(500));

    if let Some(event) = cd.stop() {
        alerts.handle(&event);
    }
    assert_eq!(alerts.scheduler().0, None);
}

proptest! {
    #[test]
    fn recompute_is_non_increasing_and_reaches_zero(
        duration in 1u64..3_600,
        steps in prop::collection::vec(0u64..5_000, 1..200),
    ) {
        let (mut cd, clock) = countdown(duration);
        cd.start(None);
        let mut last = cd.seconds_left();
        let mut elapsed = 0u64;

        for step in steps {
            clock.advance_ms(step);
            elapsed += step;
            cd.recompute();
            prop_assert!(cd.seconds_left() <= last);
            last = cd.seconds_left();
            prop_assert_eq!(cd.seconds_left(), (duration * 1000).saturating_sub(elapsed).div_ceil(1000));
            if elapsed >= duration * 1000 {
                prop_assert_eq!(cd.status(), CountdownStatus::Done);
            } else {
                prop_assert_eq!(cd.status(), CountdownStatus::Running);
            }
        }

        clock.advance(Duration::from_secs(duration));
        cd.recompute();
        prop_assert_eq!(cd.seconds_left(), 0);
        prop_assert_eq!(cd.status(), CountdownStatus::Done);
    }

    #[test]
    fn reset_always_lands_idle(seconds in 0u64..100_000, ops in prop::collection::vec(0u8..5, 0..20)) {
        let (mut cd, clock) = countdown(30);
        for op in ops {
            clock.advance_ms(700);
            match op {
                0 => { cd.start(None); }
                1 => { cd.pause(); }
                2 => { cd.resume(); }
                3 => { cd.stop(); }
                _ => { cd.recompute(); }
            }
            prop_assert_eq!(cd.end_epoch_ms().is_some(), cd.status() == CountdownStatus::Running);
        }
        cd.reset(seconds);
        prop_assert_eq!(cd.status(), CountdownStatus::Idle);
        prop_assert_eq!(cd.seconds_left(), seconds);
        prop_assert_eq!(cd.end_epoch_ms(), None);
    }
}
