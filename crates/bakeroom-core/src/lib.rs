//! # Bakeroom Core Library
//!
//! Core logic for the Bakeroom kitchen timer. Every operation is available
//! through the `bakeroom` CLI, and any other front end is a thin layer over
//! this crate.
//!
//! ## Architecture
//!
//! - **Countdown**: An anchored state machine. Remaining time is always the
//!   distance from "now" to an absolute end instant, so delayed or dropped
//!   ticks never cause drift.
//! - **Host capabilities**: The wall clock ([`Clock`]), the periodic recompute
//!   ([`Ticker`]) and foreground transitions ([`LifecycleBus`]) are injected.
//! - **Driver**: A tokio task that owns one countdown and publishes its view
//!   and events to observers.
//! - **Alerts**: Caller-side notification scheduling driven by events.
//! - **Storage**: SQLite snapshot/history storage and TOML configuration.
//!
//! ## Key Components
//!
//! - [`Countdown`]: Core countdown state machine
//! - [`CountdownDriver`]: Async host for a countdown
//! - [`AlertCoordinator`]: Maps status changes to alert scheduling
//! - [`Database`]: Snapshot and completion persistence
//! - [`Config`]: Application configuration management

pub mod alerts;
pub mod clock;
pub mod countdown;
pub mod driver;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod storage;

pub use alerts::{Alert, AlertCoordinator, AlertScheduler, LogAlertScheduler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::{
    Countdown, CountdownSnapshot, CountdownStatus, CountdownView, ManualTicker, Ticker,
    DEFAULT_RECOMPUTE_INTERVAL,
};
pub use driver::{CountdownDriver, CountdownHandle, TokioTicker};
pub use error::{AlertError, ConfigError, CoreError, DatabaseError};
pub use events::Event;
pub use lifecycle::{AppState, ForegroundWatch, LifecycleBus};
pub use storage::{CompletionRecord, Config, Database, Stats};
