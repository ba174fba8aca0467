mod engine;
mod snapshot;
mod status;
mod ticker;

pub use engine::{Countdown, DEFAULT_RECOMPUTE_INTERVAL};
pub use snapshot::CountdownSnapshot;
pub use status::{CountdownStatus, CountdownView};
pub use ticker::{ManualTicker, Ticker};
