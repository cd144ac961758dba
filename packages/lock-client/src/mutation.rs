//! Lock-protected compare-and-swap mutation of arbitrary record keys.
//!
//! `PatchKeyLocked`/`DeleteKeyLocked` (ported here as
//! [`patch_key_locked`]/[`delete_key_locked`]) let a caller that already
//! holds the lock mutate any non-reserved key in the same record under the
//! same CAS discipline the lock itself uses, bumping [`GENERATION_KEY`] on
//! every success (invariant I3).

use cmaplock_core::{next_generation, parse_generation, Record, GENERATION_KEY};

use crate::adapter::RecordStoreAdapter;
use crate::config::MAX_CONFLICT_RETRIES;
use crate::error::{AdapterError, LockError};

/// Checked by both `patch_key_locked` and `delete_key_locked` before
/// mutating: confirms `owner` still holds the lock as of the freshly read
/// `record`. Implemented per-scheme (`V1Lock`/`V2Lock` own their lock
/// state), so the mutation helpers stay scheme-agnostic.
pub trait LockOwnershipCheck {
    fn check_owner(&self, record: &Record) -> Result<(), LockError>;
}

/// Sets `key` to `value` in the record at `(namespace, name)`, retrying on
/// CAS conflict up to [`MAX_CONFLICT_RETRIES`] times, re-validating
/// ownership against the freshly read record on every attempt.
pub async fn patch_key_locked(
    store: &dyn RecordStoreAdapter,
    namespace: &str,
    name: &str,
    ownership: &dyn LockOwnershipCheck,
    key: &str,
    value: &str,
) -> Result<(), LockError> {
    for _ in 0..MAX_CONFLICT_RETRIES {
        let mut record = store.get_record(namespace, name).await?;
        ownership
            .check_owner(&record)
            .map_err(|cause| LockError::LockCheckFailed(Box::new(cause)))?;

        let current_gen = parse_generation(record.data.get(GENERATION_KEY).map(String::as_str));
        record.data.insert(key.to_string(), value.to_string());
        record
            .data
            .insert(GENERATION_KEY.to_string(), next_generation(current_gen).to_string());

        match store.update_record(record).await {
            Ok(_) => return Ok(()),
            Err(AdapterError::Conflict { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(LockError::ConflictRetriesExhausted)
}

/// Removes `key` from the record at `(namespace, name)` under the same CAS
/// discipline as [`patch_key_locked`].
pub async fn delete_key_locked(
    store: &dyn RecordStoreAdapter,
    namespace: &str,
    name: &str,
    ownership: &dyn LockOwnershipCheck,
    key: &str,
) -> Result<(), LockError> {
    for _ in 0..MAX_CONFLICT_RETRIES {
        let mut record = store.get_record(namespace, name).await?;
        ownership
            .check_owner(&record)
            .map_err(|cause| LockError::LockCheckFailed(Box::new(cause)))?;

        let current_gen = parse_generation(record.data.get(GENERATION_KEY).map(String::as_str));
        record.data.remove(key);
        record
            .data
            .insert(GENERATION_KEY.to_string(), next_generation(current_gen).to_string());

        match store.update_record(record).await {
            Ok(_) => return Ok(()),
            Err(AdapterError::Conflict { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(LockError::ConflictRetriesExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_adapter::InMemoryRecordStore;

    struct AlwaysOwner;
    impl LockOwnershipCheck for AlwaysOwner {
        fn check_owner(&self, _record: &Record) -> Result<(), LockError> {
            Ok(())
        }
    }

    struct NeverOwner;
    impl LockOwnershipCheck for NeverOwner {
        fn check_owner(&self, _record: &Record) -> Result<(), LockError> {
            Err(LockError::LockLost { key: None })
        }
    }

    #[tokio::test]
    async fn patch_sets_value_and_bumps_generation() {
        let store = InMemoryRecordStore::new();
        store.create_record(Record::new("ns", "rec")).await.unwrap();

        patch_key_locked(&store, "ns", "rec", &AlwaysOwner, "replicas", "3")
            .await
            .unwrap();

        let record = store.get_record("ns", "rec").await.unwrap();
        assert_eq!(record.data.get("replicas"), Some(&"3".to_string()));
        assert_eq!(record.data.get(GENERATION_KEY), Some(&"1".to_string()));

        patch_key_locked(&store, "ns", "rec", &AlwaysOwner, "replicas", "4")
            .await
            .unwrap();
        let record = store.get_record("ns", "rec").await.unwrap();
        assert_eq!(record.data.get(GENERATION_KEY), Some(&"2".to_string()));
    }

    #[tokio::test]
    async fn patch_without_ownership_is_rejected() {
        let store = InMemoryRecordStore::new();
        store.create_record(Record::new("ns", "rec")).await.unwrap();

        let err = patch_key_locked(&store, "ns", "rec", &NeverOwner, "replicas", "3")
            .await
            .unwrap_err();
        match err {
            LockError::LockCheckFailed(cause) => {
                assert!(matches!(*cause, LockError::LockLost { .. }));
            }
            other => panic!("expected LockCheckFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_removes_key_and_bumps_generation() {
        let store = InMemoryRecordStore::new();
        let mut record = Record::new("ns", "rec");
        record.data.insert("replicas".into(), "3".into());
        store.create_record(record).await.unwrap();

        delete_key_locked(&store, "ns", "rec", &AlwaysOwner, "replicas")
            .await
            .unwrap();

        let record = store.get_record("ns", "rec").await.unwrap();
        assert!(!record.data.contains_key("replicas"));
        assert_eq!(record.data.get(GENERATION_KEY), Some(&"1".to_string()));
    }
}
