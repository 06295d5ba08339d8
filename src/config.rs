//! Startup configuration (C9).
//!
//! Loaded from environment variables per SPEC_FULL.md §4.9. Command-line
//! parsing is out of scope (spec.md §1 treats it as an external
//! collaborator); `Config` is the interface this module exposes.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{DigitsError, Result};
use crate::ring::wait_strategy::WaitStrategy;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_RING_CAPACITY: usize = 1_048_576;
pub const DEFAULT_WORKER_COUNT: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub journal_directory: PathBuf,
    pub wait_strategy: WaitStrategy,
    pub single_threaded: bool,
    pub ring_capacity: usize,
    pub worker_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            journal_directory: std::env::temp_dir(),
            wait_strategy: WaitStrategy::Block,
            single_threaded: false,
            ring_capacity: DEFAULT_RING_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to spec
    /// defaults for anything unset. A malformed value is startup-fatal.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(raw) = std::env::var("DIGITS_PORT") {
            config.port = raw
                .parse()
                .map_err(|_| DigitsError::config(format!("DIGITS_PORT: not a valid port: {raw}")))?;
        }

        if let Ok(raw) = std::env::var("DIGITS_JOURNAL_DIR") {
            config.journal_directory = PathBuf::from(raw);
        }

        if let Ok(raw) = std::env::var("DIGITS_WAIT_STRATEGY") {
            config.wait_strategy = WaitStrategy::from_str(&raw).map_err(|_| {
                DigitsError::config(format!(
                    "DIGITS_WAIT_STRATEGY: unknown strategy {raw:?} (expected block|sleep|yield|busy)"
                ))
            })?;
        }

        if let Ok(raw) = std::env::var("DIGITS_SINGLE_THREADED") {
            config.single_threaded = parse_bool(&raw).ok_or_else(|| {
                DigitsError::config(format!("DIGITS_SINGLE_THREADED: not a bool: {raw}"))
            })?;
        }

        Ok(config)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.journal_directory.join("numbers.log")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
