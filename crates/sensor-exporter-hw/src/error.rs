//! Error types for the sensor reading library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that prevent a source from producing a snapshot.
#[derive(Error, Debug)]
pub enum Error {
    /// Sensor directory or snapshot file does not exist.
    #[error("sensor source not found at {}", .0.display())]
    SourceNotFound(PathBuf),

    /// I/O error while reading sensor data.
    #[error("sensor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External sensor command could not be run or exited unsuccessfully.
    #[error("sensor command `{program}` failed: {reason}")]
    Command { program: String, reason: String },

    /// Snapshot document is not valid JSON.
    #[error("malformed sensor snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot document root is not a JSON object.
    #[error("sensor snapshot must be a JSON object, got {0}")]
    InvalidSnapshot(&'static str),

    /// A panic while holding an exclusive source poisoned its lock.
    #[error("sensor source `{0}` is poisoned")]
    Poisoned(String),
}
