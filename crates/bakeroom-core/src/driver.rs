//! Async countdown host.
//!
//! A [`CountdownDriver`] moves one countdown into a tokio task. The task
//! owns the countdown exclusively; callers talk to it through a
//! [`CountdownHandle`]:
//!
//! - commands go in over an mpsc channel and are answered with the
//!   resulting event; [`CountdownHandle::snapshot`] asks for the full state
//!   the same way,
//! - the live [`CountdownView`] is published on a `watch` channel after every
//!   command, tick and foreground transition,
//! - every [`Event`] is broadcast to subscribers (alerts, persistence, UI).

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::countdown::{Countdown, CountdownSnapshot, CountdownView, Ticker};
use crate::events::Event;
use crate::lifecycle::{AppState, ForegroundWatch};

const EVENT_CAPACITY: usize = 64;

/// [`Ticker`] backed by a tokio interval. Disarmed, [`tick`](Self::tick)
/// never completes.
#[derive(Debug, Default)]
pub struct TokioTicker {
    interval: Option<Interval>,
}

impl TokioTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next period.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Ticker for TokioTicker {
    fn arm(&mut self, period: Duration) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // Late ticks are skipped, not replayed.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
    }

    fn disarm(&mut self) {
        self.interval = None;
    }

    fn is_armed(&self) -> bool {
        self.interval.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Start(Option<u64>),
    Pause,
    Resume,
    Stop,
    Reset(u64),
}

enum Request {
    Command {
        command: Command,
        reply: oneshot::Sender<Option<Event>>,
    },
    Snapshot(oneshot::Sender<CountdownSnapshot>),
}

enum Wake {
    Request(Request),
    Tick,
    Lifecycle(AppState),
    Closed,
}

/// Spawns countdown host tasks.
pub struct CountdownDriver;

impl CountdownDriver {
    /// Host `countdown` on the current tokio runtime.
    pub fn spawn<C>(countdown: Countdown<C, TokioTicker>) -> CountdownHandle
    where
        C: Clock + Send + 'static,
    {
        Self::spawn_inner(countdown, None)
    }

    /// Like [`spawn`](Self::spawn), forcing a recompute whenever `lifecycle`
    /// reports a return to the foreground.
    pub fn spawn_with_lifecycle<C>(
        countdown: Countdown<C, TokioTicker>,
        lifecycle: broadcast::Receiver<AppState>,
    ) -> CountdownHandle
    where
        C: Clock + Send + 'static,
    {
        Self::spawn_inner(countdown, Some(lifecycle))
    }

    fn spawn_inner<C>(
        countdown: Countdown<C, TokioTicker>,
        lifecycle: Option<broadcast::Receiver<AppState>>,
    ) -> CountdownHandle
    where
        C: Clock + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(countdown.view());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let task = tokio::spawn(run(
            countdown,
            commands_rx,
            lifecycle,
            view_tx,
            events_tx.clone(),
        ));

        CountdownHandle {
            commands: commands_tx,
            view: view_rx,
            events: events_tx,
            task,
        }
    }
}

/// Caller side of a hosted countdown.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) ends the
/// host task.
pub struct CountdownHandle {
    commands: mpsc::UnboundedSender<Request>,
    view: watch::Receiver<CountdownView>,
    events: broadcast::Sender<Event>,
    task: JoinHandle<CountdownSnapshot>,
}

impl CountdownHandle {
    pub async fn start(&self, seconds: Option<u64>) -> Option<Event> {
        self.send(Command::Start(seconds)).await
    }

    pub async fn pause(&self) -> Option<Event> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Option<Event> {
        self.send(Command::Resume).await
    }

    pub async fn stop(&self) -> Option<Event> {
        self.send(Command::Stop).await
    }

    pub async fn reset(&self, seconds: u64) -> Option<Event> {
        self.send(Command::Reset(seconds)).await
    }

    /// The most recently published view.
    pub fn view(&self) -> CountdownView {
        *self.view.borrow()
    }

    /// A receiver that wakes whenever a new view is published.
    pub fn watch(&self) -> watch::Receiver<CountdownView> {
        self.view.clone()
    }

    /// Receive every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// The hosted countdown's state, reflecting every event broadcast before
    /// this call. `None` once the host task has ended.
    pub async fn snapshot(&self) -> Option<CountdownSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Request::Snapshot(reply)).ok()?;
        rx.await.ok()
    }

    /// Stop hosting and hand back the final state. `None` if the host task
    /// panicked or was aborted.
    pub async fn shutdown(self) -> Option<CountdownSnapshot> {
        drop(self.commands);
        match self.task.await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("countdown host task failed: {e}");
                None
            }
        }
    }

    async fn send(&self, command: Command) -> Option<Event> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Request::Command { command, reply }).is_err() {
            debug!(?command, "countdown host is gone, dropping command");
            return None;
        }
        rx.await.ok().flatten()
    }
}

async fn run<C: Clock>(
    mut countdown: Countdown<C, TokioTicker>,
    mut commands: mpsc::UnboundedReceiver<Request>,
    mut lifecycle: Option<broadcast::Receiver<AppState>>,
    view_tx: watch::Sender<CountdownView>,
    events_tx: broadcast::Sender<Event>,
) -> CountdownSnapshot {
    info!(
        status = %countdown.status(),
        seconds_left = countdown.seconds_left(),
        "countdown host started"
    );
    let mut foreground = ForegroundWatch::new();

    loop {
        let wake = tokio::select! {
            request = commands.recv() => match request {
                Some(request) => Wake::Request(request),
                None => Wake::Closed,
            },
            _ = countdown.ticker_mut().tick() => Wake::Tick,
            state = next_state(&mut lifecycle) => Wake::Lifecycle(state),
        };

        let (event, reply) = match wake {
            Wake::Closed => break,
            Wake::Request(Request::Command { command, reply }) => {
                (apply(&mut countdown, command), Some(reply))
            }
            Wake::Request(Request::Snapshot(reply)) => {
                let _ = reply.send(countdown.snapshot());
                continue;
            }
            Wake::Tick => (countdown.recompute(), None),
            Wake::Lifecycle(state) => {
                if foreground.observe(state) {
                    debug!("foreground transition, recomputing");
                    (countdown.on_foreground(), None)
                } else {
                    (None, None)
                }
            }
        };

        view_tx.send_replace(countdown.view());
        if let Some(event) = &event {
            if matches!(event, Event::CountdownCompleted { .. }) {
                info!(initial_seconds = countdown.initial_seconds(), "countdown completed");
            }
            // No subscribers is fine.
            let _ = events_tx.send(event.clone());
        }
        if let Some(reply) = reply {
            let _ = reply.send(event);
        }
    }

    info!(status = %countdown.status(), "countdown host stopped");
    countdown.snapshot()
}

fn apply<C: Clock, T: Ticker>(countdown: &mut Countdown<C, T>, command: Command) -> Option<Event> {
    match command {
        Command::Start(seconds) => countdown.start(seconds),
        Command::Pause => countdown.pause(),
        Command::Resume => countdown.resume(),
        Command::Stop => countdown.stop(),
        Command::Reset(seconds) => countdown.reset(seconds),
    }
}

async fn next_state(lifecycle: &mut Option<broadcast::Receiver<AppState>>) -> AppState {
    loop {
        let Some(rx) = lifecycle.as_mut() else {
            return std::future::pending().await;
        };
        let received = rx.recv().await;
        match received {
            Ok(state) => return state,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "lifecycle receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("lifecycle bus closed");
                *lifecycle = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::countdown::CountdownStatus;
    use crate::lifecycle::LifecycleBus;

    const T0: u64 = 1_700_000_000_000;

    fn hosted(secs: u64) -> (Countdown<ManualClock, TokioTicker>, ManualClock) {
        let clock = ManualClock::new(T0);
        (Countdown::new(secs, clock.clone(), TokioTicker::new()), clock)
    }

    #[tokio::test(start_paused = true)]
    async fn commands_reply_with_events() {
        let (countdown, _) = hosted(60);
        let handle = CountdownDriver::spawn(countdown);

        assert!(matches!(
            handle.start(None).await,
            Some(Event::CountdownStarted { duration_secs: 60, .. })
        ));
        assert_eq!(handle.view().status, CountdownStatus::Running);
        assert!(handle.resume().await.is_none());
        assert!(handle.pause().await.is_some());
        assert_eq!(handle.view().status, CountdownStatus::Paused);
        assert!(handle.reset(30).await.is_some());
        assert_eq!(
            handle.view(),
            CountdownView {
                seconds_left: 30,
                status: CountdownStatus::Idle
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_complete_running_countdown() {
        let (countdown, clock) = hosted(10);
        let handle = CountdownDriver::spawn(countdown);
        let mut events = handle.subscribe();

        handle.start(None).await;
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::CountdownStarted { .. }
        ));

        clock.advance(Duration::from_secs(10));
        let completed = events.recv().await.unwrap();
        assert!(matches!(
            completed,
            Event::CountdownCompleted {
                initial_seconds: 10,
                ..
            }
        ));
        assert_eq!(
            handle.view(),
            CountdownView {
                seconds_left: 0,
                status: CountdownStatus::Done
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_ticks() {
        let (countdown, clock) = hosted(5);
        let handle = CountdownDriver::spawn(countdown);
        handle.start(None).await;
        handle.stop().await;

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.view().status, CountdownStatus::Stopped);
        assert_eq!(handle.view().seconds_left, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_forces_recompute() {
        let (countdown, clock) = hosted(600);
        // Ticks far apart so only the foreground transition can update the view.
        let countdown = countdown.with_interval(Duration::from_secs(3600));
        let bus = LifecycleBus::new();
        let handle = CountdownDriver::spawn_with_lifecycle(countdown, bus.subscribe());
        handle.start(None).await;

        bus.notify(AppState::Background);
        clock.advance(Duration::from_secs(50));
        bus.notify(AppState::Active);

        let mut view = handle.watch();
        let caught_up = tokio::time::timeout(Duration::from_secs(1), async {
            while view.borrow_and_update().seconds_left != 550 {
                view.changed().await.unwrap();
            }
        })
        .await;
        assert!(caught_up.is_ok(), "view never caught up: {:?}", handle.view());
        assert_eq!(handle.view().status, CountdownStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_follows_broadcast_events() {
        let (countdown, clock) = hosted(30);
        let handle = CountdownDriver::spawn(countdown);
        let mut events = handle.subscribe();
        handle.start(None).await;
        events.recv().await.unwrap();

        clock.advance(Duration::from_secs(30));
        assert!(events.recv().await.unwrap().completed_at().is_some());
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.status, CountdownStatus::Done);
        assert_eq!(snapshot.seconds_left, 0);
        assert_eq!(snapshot.end_epoch_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_overlay_does_not_recompute() {
        let (countdown, clock) = hosted(600);
        let countdown = countdown.with_interval(Duration::from_secs(3600));
        let bus = LifecycleBus::new();
        let handle = CountdownDriver::spawn_with_lifecycle(countdown, bus.subscribe());
        handle.start(None).await;

        bus.notify(AppState::Inactive);
        clock.advance(Duration::from_secs(50));
        bus.notify(AppState::Active);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.view().seconds_left, 600);
        assert_eq!(handle.snapshot().await.unwrap().seconds_left, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_snapshot() {
        let (countdown, clock) = hosted(120);
        let handle = CountdownDriver::spawn(countdown);
        handle.start(None).await;
        clock.advance(Duration::from_secs(20));
        handle.pause().await;

        let live = handle.snapshot().await.unwrap();
        assert_eq!(live.status, CountdownStatus::Paused);
        assert_eq!(live.seconds_left, 100);

        let snapshot = handle.shutdown().await.unwrap();
        assert_eq!(snapshot.status, CountdownStatus::Paused);
        assert_eq!(snapshot.seconds_left, 100);
        assert_eq!(snapshot.end_epoch_ms, None);
    }
}
