use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single explorer request. Every variant is retryable; after the
/// last attempt the fetcher treats it as an empty page.
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("explorer responded with HTTP {0}")]
    Status(u16),

    #[error("explorer API error: {message} ({result})")]
    Api { message: String, result: String },

    #[error("malformed explorer response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected explorer payload: {0}")]
    Malformed(String),
}

/// Per-record failure; the record is skipped and the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not an unsigned integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("timestamp {0} cannot be represented")]
    TimestampOutOfRange(i64),

    #[error("gas fee exceeds 256 bits")]
    Overflow,
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Address {0} is invalid or not checksummed")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Spill merge failed, batch files kept in {}: {source}", dir.display())]
    SpillMerge {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
