//! Parse errors produced by the core's (de)serialization helpers.

use thiserror::Error;

/// Failure decoding or encoding the `locks` reserved key.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed locks entry: {0}")]
    Locks(#[from] serde_json::Error),
}
