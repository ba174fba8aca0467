pub mod config;
pub mod timer;
mod watch;
