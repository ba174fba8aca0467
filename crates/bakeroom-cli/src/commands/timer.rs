use bakeroom_core::{
    Clock, Config, Countdown, Database, DatabaseError, Event, ManualTicker, SystemClock, Ticker,
};
use clap::Subcommand;
use tracing::{debug, warn};

use super::watch;

const COMMIT_ATTEMPTS: u32 = 3;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start the countdown (continues a stopped countdown when no length is given)
    Start {
        /// Countdown length in seconds
        #[arg(long, conflicts_with = "preset")]
        seconds: Option<u64>,
        /// Named preset from the config (e.g. "proof")
        #[arg(long)]
        preset: Option<String>,
    },
    /// Pause a running countdown
    Pause,
    /// Resume a paused countdown
    Resume,
    /// Stop the countdown
    Stop,
    /// Reset to idle
    Reset {
        /// New countdown length in seconds (defaults to countdown.default_seconds)
        seconds: Option<u64>,
    },
    /// Print current countdown state as JSON
    Status,
    /// Follow the countdown until it finishes
    Watch {
        /// Print each update as a JSON line instead of a clock face
        #[arg(long)]
        json: bool,
    },
    /// List configured presets
    Presets,
    /// Show finished countdowns
    History {
        /// Number of entries to show
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Restore the persisted countdown, or a fresh one when nothing usable is
/// stored, along with the store revision it was read at.
pub(crate) fn load_countdown<T: Ticker>(
    db: &Database,
    config: &Config,
    ticker: T,
) -> Result<(u64, Countdown<SystemClock, T>), DatabaseError> {
    // Revision first: a write landing between the two reads then surfaces as
    // a conflict on commit instead of being overwritten.
    let revision = db.snapshot_revision()?;
    let countdown = match db.load_snapshot() {
        Ok(Some(snapshot)) => Countdown::restore(&snapshot, SystemClock, ticker),
        Ok(None) => Countdown::new(config.countdown.default_seconds, SystemClock, ticker),
        Err(e) => {
            warn!("discarding unreadable countdown snapshot: {e}");
            Countdown::new(config.countdown.default_seconds, SystemClock, ticker)
        }
    };
    Ok((revision, countdown.with_interval(config.recompute_interval())))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;

    match action {
        TimerAction::Watch { json } => watch::run(&db, &config, json),
        TimerAction::Presets => {
            for (name, secs) in &config.presets {
                println!("{name}\t{secs}");
            }
            Ok(())
        }
        TimerAction::History { limit, json } => history(&db, limit, json),
        action => one_shot(&db, &config, action),
    }
}

fn history(db: &Database, limit: usize, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let records = db.recent_completions(limit)?;
    if json {
        return print_json(&records);
    }
    let stats = db.stats(SystemClock.now())?;
    for record in &records {
        println!(
            "{}\t{}s",
            record.completed_at.format("%Y-%m-%d %H:%M:%S"),
            record.duration_secs
        );
    }
    println!(
        "today: {} ({}s), total: {} ({}s)",
        stats.today_completed, stats.today_secs, stats.total_completed, stats.total_secs
    );
    Ok(())
}

/// Restore, catch up, apply one command, persist, print.
///
/// Nothing is written for a no-op. A change is only written if no other
/// command changed the countdown in the meantime; otherwise the whole
/// command is replayed on the new state.
fn one_shot(
    db: &Database,
    config: &Config,
    action: TimerAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let start_seconds = match &action {
        TimerAction::Start {
            preset: Some(name), ..
        } => Some(config.preset_seconds(name)?),
        TimerAction::Start { seconds, .. } => *seconds,
        _ => None,
    };

    let mut attempt = 1;
    loop {
        let (revision, mut countdown) = load_countdown(db, config, ManualTicker::new())?;
        let mut output = Vec::new();

        // Catch up with time that passed since the last invocation.
        let caught_up = countdown.recompute();
        let mut completed_at = caught_up.as_ref().and_then(Event::completed_at);
        let mut changed = caught_up.is_some();
        if let Some(event) = caught_up {
            if !matches!(action, TimerAction::Status) {
                output.push(event);
            }
        }

        let event = match action {
            TimerAction::Start { .. } => countdown.start(start_seconds),
            TimerAction::Pause => countdown.pause(),
            TimerAction::Resume => countdown.resume(),
            TimerAction::Stop => countdown.stop(),
            TimerAction::Reset { seconds } => {
                countdown.reset(seconds.unwrap_or(config.countdown.default_seconds))
            }
            TimerAction::Status
            | TimerAction::Watch { .. }
            | TimerAction::Presets
            | TimerAction::History { .. } => None,
        };
        match event {
            Some(event) => {
                changed = true;
                completed_at = completed_at.or(event.completed_at());
                output.push(event);
            }
            None => output.push(countdown.snapshot_event()),
        }
        if !changed {
            break output.iter().try_for_each(print_json);
        }

        match db.commit_snapshot(revision, &countdown.snapshot(), completed_at) {
            Ok(_) => break output.iter().try_for_each(print_json),
            Err(DatabaseError::Conflict { .. }) if attempt < COMMIT_ATTEMPTS => {
                debug!(attempt, "countdown changed concurrently, retrying");
                attempt += 1;
            }
            Err(e) => break Err(e.into()),
        }
    }
}
