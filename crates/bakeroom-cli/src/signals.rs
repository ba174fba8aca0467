//! Terminal job-control signals as lifecycle transitions.

use bakeroom_core::{AppState, LifecycleBus};
use futures::stream::StreamExt;
use signal_hook_tokio::Signals;
use tracing::{debug, info};

/// Report every SIGCONT (the shell resumed us after Ctrl-Z) on `bus` as a
/// trip through the background and back.
pub fn forward_sigcont(bus: LifecycleBus) -> std::io::Result<()> {
    let mut signals = Signals::new([signal_hook::consts::SIGCONT])?;
    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            debug!(signal, "received signal");
            info!("resumed from job control, recomputing");
            bus.notify(AppState::Background);
            bus.notify(AppState::Active);
        }
    });
    Ok(())
}
