//! Dashprobe Common Library
//!
//! Shared workspace types, the poll-wait engine and harness configuration
//! used by the orchestrator and the CLI.

pub mod config;
pub mod error;
pub mod poll;
pub mod types;

// Re-export commonly used types
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use poll::{poll_until, poll_until_deadline, PollOutcome, PollPolicy};
pub use types::*;

/// Dashprobe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".dashprobe")
        .join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
