//! Error taxonomy for the lock engine, in the style of the teacher's
//! `OperationError`/`ClassifyError` structured variants.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure modes surfaced by [`crate::v1::V1Lock`] and [`crate::v2::V2Lock`].
#[derive(Debug, Error)]
pub enum LockError {
    /// The record is currently held by someone else and has not expired.
    #[error("locked by {owner} until {expires_at}")]
    Locked {
        owner: String,
        expires_at: DateTime<Utc>,
    },

    /// This process believed it held the lock, but the backing record no
    /// longer agrees (another owner took over, or the slot was cleared).
    #[error("lock lost{}", key.as_deref().map(|k| format!(" for key {k}")).unwrap_or_default())]
    LockLost { key: Option<String> },

    /// A liveness probe (`IsKeyLocked`-style check) could not be completed.
    #[error("lock check failed: {0}")]
    LockCheckFailed(Box<LockError>),

    /// `PatchKeyLocked`/`DeleteKeyLocked` was called with an empty `owner`
    /// argument; always a caller bug, never wrapped any further.
    #[error("owner must not be empty")]
    EmptyOwner,

    /// Either an outer retry budget or the acquire attempt count was
    /// exhausted. `causes` joins every transient failure observed along
    /// the way.
    #[error("timed out after {attempts} attempt(s): {causes}")]
    Timeout { attempts: u32, causes: String },

    /// CAS conflicts on the backing record outlasted the bounded internal
    /// retry budget for a single locked operation.
    #[error("conflicting writes exhausted the retry budget")]
    ConflictRetriesExhausted,

    /// The `locks` reserved key could not be parsed or re-encoded.
    #[error("malformed lock data: {0}")]
    MalformedLockData(String),

    /// The underlying record store adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Failure modes an [`crate::adapter::RecordStoreAdapter`] implementation
/// reports back to the engine.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("record {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("record {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    /// The caller's `resource_version` is stale; the engine should re-read
    /// and retry.
    #[error("record {namespace}/{name} changed concurrently")]
    Conflict { namespace: String, name: String },

    #[error("transport error: {0}")]
    Transport(String),
}
