//! Digit ingestion server: deduplicates a stream of fixed-width decimal
//! messages from many TCP clients into a durable journal.

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod dedup;
pub mod error;
pub mod frame;
pub mod journal;
pub mod ring;
pub mod server;
pub mod single_threaded;
pub mod stats;

pub use config::Config;
pub use error::{DigitsError, Result};
pub use server::{run_until_signal, start, ServerHandle};
