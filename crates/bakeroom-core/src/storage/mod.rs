mod config;
pub mod database;

pub use config::{Config, CountdownConfig, NotificationsConfig};
pub use database::{CompletionRecord, Database, Stats};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `BAKEROOM_DATA_DIR` wins when set. Otherwise `~/.config/bakeroom`, or
/// `~/.config/bakeroom-dev` when `BAKEROOM_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("BAKEROOM_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("BAKEROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("bakeroom-dev")
            } else {
                base_dir.join("bakeroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
