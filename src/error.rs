use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the local side of hashbin: storage, scanning,
/// submission validation and configuration.
///
/// Network-facing code (protocol, server, sync) works in `anyhow` and only
/// meets this type through `?`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// User-facing rejection of a submission; nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
