//! Error types for the digit ingestion server.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DigitsError>;

#[derive(Error, Debug)]
pub enum DigitsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[error("failed to open journal file {path:?}: {source}")]
    JournalOpen { path: PathBuf, source: std::io::Error },

    #[error("ring buffer is full")]
    RingFull,
}

impl DigitsError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}
