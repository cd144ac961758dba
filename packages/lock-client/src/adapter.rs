//! The boundary between the lock engine and whatever store actually holds
//! the record (an orchestrator's config-map, a key-value service, etc).
//!
//! Grounded on the teacher's `RecordStore`/`StorageEngine` traits
//! (`storage/record_store.rs`, `storage/engine.rs`): an `async_trait`,
//! object-safe, `Send + Sync` boundary the engine depends on and a concrete
//! implementation supplies.

use async_trait::async_trait;
use cmaplock_core::Record;

use crate::error::AdapterError;

/// CRUD access to the external record store, scoped to one record at a
/// time. Implementations own whatever transport (REST, gRPC, a local file)
/// gets the bytes there; the engine only reasons about `Record` values and
/// `resource_version`-based optimistic concurrency.
#[async_trait]
pub trait RecordStoreAdapter: Send + Sync {
    /// Fetches the current record. Returns `AdapterError::NotFound` if it
    /// does not exist yet.
    async fn get_record(&self, namespace: &str, name: &str) -> Result<Record, AdapterError>;

    /// Creates a new record. Returns `AdapterError::AlreadyExists` if one is
    /// already present at `(namespace, name)`.
    async fn create_record(&self, record: Record) -> Result<Record, AdapterError>;

    /// Updates a record, enforcing that `record.resource_version` still
    /// matches the stored value. Returns `AdapterError::Conflict` if it has
    /// since changed, so the caller can re-read and retry.
    async fn update_record(&self, record: Record) -> Result<Record, AdapterError>;

    /// Deletes a record. Implementations should prefer foreground
    /// propagation — the record should be gone by the time this returns —
    /// so a caller that immediately re-`create_record`s never races a
    /// lingering delete. Returns `AdapterError::NotFound` if already absent.
    async fn delete_record(&self, namespace: &str, name: &str) -> Result<(), AdapterError>;
}
