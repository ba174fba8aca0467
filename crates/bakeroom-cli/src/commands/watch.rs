//! `bakeroom timer watch`: host the countdown in-process until it ends.
//!
//! Other `bakeroom timer ...` commands may run while a watch is active. The
//! watcher writes the stored snapshot after every event and checks its
//! revision periodically; when another command has written since, the
//! hosted countdown is dropped and the stored one is picked up instead.

use std::time::Duration;

use bakeroom_core::{
    AlertCoordinator, Config, CountdownDriver, CountdownHandle, CountdownSnapshot, CountdownStatus,
    CountdownView, Database, DatabaseError, Event, LifecycleBus, LogAlertScheduler, TokioTicker,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::timer::load_countdown;

const HELP: &str = "commands: p(ause) r(esume) s(top) q(uit)";

/// How often the stored snapshot is checked for changes by other commands.
const SYNC_INTERVAL: Duration = Duration::from_millis(500);

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn run(db: &Database, config: &Config, json: bool) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(watch(db, config, json));
    // A pending stdin read must not hold up exit.
    runtime.shutdown_background();
    result
}

fn render(view: CountdownView, json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string(&view)?);
    } else {
        eprint!("\r{:>8}  {:<8}", view.clock_face(), view.status.as_str());
    }
    Ok(())
}

/// Write `snapshot` if nobody else has since `revision`. `None` on conflict.
fn persist(
    db: &Database,
    revision: u64,
    snapshot: &CountdownSnapshot,
    event: Option<&Event>,
) -> Result<Option<u64>, DatabaseError> {
    match db.commit_snapshot(revision, snapshot, event.and_then(Event::completed_at)) {
        Ok(revision) => Ok(Some(revision)),
        Err(DatabaseError::Conflict { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Why hosting one countdown ended.
enum Exit {
    /// Completed or stopped; the final state is ours to save.
    Finished,
    /// The user quit; the countdown carries on without a host.
    Quit,
    /// Another command changed the stored countdown.
    Changed,
}

struct Watcher<'a> {
    db: &'a Database,
    json: bool,
    alerts: AlertCoordinator<LogAlertScheduler>,
    input: Lines<BufReader<Stdin>>,
    input_open: bool,
}

async fn watch(db: &Database, config: &Config, json: bool) -> CliResult<()> {
    let alerts = AlertCoordinator::new(
        LogAlertScheduler::new(config.notifications.bell),
        config.alert(),
    )
    .with_enabled(config.notifications.enabled);
    let mut watcher = Watcher {
        db,
        json,
        alerts,
        input: BufReader::new(tokio::io::stdin()).lines(),
        input_open: true,
    };

    let bus = LifecycleBus::new();
    #[cfg(unix)]
    {
        if let Err(e) = crate::signals::forward_sigcont(bus.clone()) {
            warn!("job-control signals unavailable: {e}");
        }
    }

    let mut adopted = false;
    loop {
        let (mut revision, mut countdown) = load_countdown(db, config, TokioTicker::new())?;
        if let Some(event) = countdown.recompute() {
            match persist(db, revision, &countdown.snapshot(), Some(&event))? {
                Some(next) => revision = next,
                None => continue,
            }
        }

        match countdown.status() {
            CountdownStatus::Running => watcher.alerts.arm(countdown.seconds_left()),
            CountdownStatus::Paused => watcher.alerts.cancel(),
            status => {
                watcher.alerts.cancel();
                render(countdown.view(), json)?;
                if !json {
                    eprintln!();
                }
                if adopted {
                    eprintln!("countdown is {status} (changed by another command)");
                } else {
                    eprintln!("countdown is {status}; start it first");
                }
                return Ok(());
            }
        }

        let handle = CountdownDriver::spawn_with_lifecycle(countdown, bus.subscribe());
        if !json && !adopted {
            eprintln!("{HELP}");
        }
        let exit = watcher.host(&handle, &mut revision).await?;
        let snapshot = handle.shutdown().await;

        match exit {
            Exit::Changed => {
                info!("countdown changed by another command, reloading");
                adopted = true;
            }
            Exit::Finished | Exit::Quit => {
                if let Some(snapshot) = snapshot {
                    if persist(db, revision, &snapshot, None)?.is_none() {
                        info!("stored countdown changed, leaving it as is");
                    }
                }
                if !json {
                    eprintln!();
                }
                return Ok(());
            }
        }
    }
}

impl Watcher<'_> {
    /// Follow one hosted countdown until it ends, the user quits or another
    /// command takes over. `revision` tracks the watcher's own writes.
    async fn host(&mut self, handle: &CountdownHandle, revision: &mut u64) -> CliResult<Exit> {
        let mut events = handle.subscribe();
        let mut view = handle.watch();
        let mut sync = tokio::time::interval(SYNC_INTERVAL);
        sync.set_missed_tick_behavior(MissedTickBehavior::Skip);
        render(*view.borrow_and_update(), self.json)?;

        loop {
            tokio::select! {
                // The driver publishes the view before the event; render first.
                biased;
                changed = view.changed() => {
                    if changed.is_err() {
                        return Ok(Exit::Finished);
                    }
                    render(*view.borrow_and_update(), self.json)?;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        let Some(snapshot) = handle.snapshot().await else {
                            return Ok(Exit::Finished);
                        };
                        match persist(self.db, *revision, &snapshot, Some(&event))? {
                            Some(next) => *revision = next,
                            None => return Ok(Exit::Changed),
                        }
                        self.alerts.handle(&event);
                        match event {
                            Event::CountdownCompleted { .. } => {
                                self.alerts.fire_now();
                                return Ok(Exit::Finished);
                            }
                            Event::CountdownStopped { .. } => return Ok(Exit::Finished),
                            _ => {}
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed countdown events"),
                    Err(RecvError::Closed) => return Ok(Exit::Finished),
                },
                _ = sync.tick() => {
                    let stored = self.db.snapshot_revision()?;
                    if stored != *revision {
                        debug!(stored, ours = *revision, "stored countdown moved on");
                        return Ok(Exit::Changed);
                    }
                }
                line = self.input.next_line(), if self.input_open => match line {
                    Ok(Some(line)) => match line.trim() {
                        "p" | "pause" => { handle.pause().await; }
                        "r" | "resume" => { handle.resume().await; }
                        "s" | "stop" => { handle.stop().await; }
                        "q" | "quit" => return Ok(Exit::Quit),
                        "" => {}
                        _ => eprintln!("{HELP}"),
                    },
                    Ok(None) => self.input_open = false,
                    Err(e) => {
                        warn!("stdin unavailable: {e}");
                        self.input_open = false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, leaving countdown as is");
                    return Ok(Exit::Quit);
                }
            }
        }
    }
}
