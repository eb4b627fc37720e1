//! Error taxonomy shared by every fallible operation in the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying file operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A key-log record or payload did not survive verification outside of
    /// recovery, where the same condition is handled by truncation instead.
    #[error("corrupt entry: {0}")]
    Corrupt(String),

    /// Encoding an unsupported value, or decoding an intact payload, failed.
    #[error("codec error: {0}")]
    Codec(String),
}
