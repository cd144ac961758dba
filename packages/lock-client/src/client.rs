//! Bootstrap and top-level client surface, grounded on the Go source's
//! `New`/`coreConfigMap` (`coreconfigmap.go`): creates the backing record if
//! absent, keeps a v1 and a v2 lock side by side on it, and dispatches
//! `PatchKeyLocked`/`DeleteKeyLocked` to the right scheme's ownership check.
//!
//! The Go source's "copylock" namespace-migration path
//! (`coreconfigmap.go::New`'s second `ConfigMap` plus `configmap.go`'s
//! `Instance()` swap) is deliberately not reproduced here; see `DESIGN.md`.

use std::collections::BTreeMap;
use std::sync::Arc;

use cmaplock_core::{compose_name, parse_locks, Record, LOCKS_KEY, OWNER_KEY};

use crate::adapter::RecordStoreAdapter;
use crate::config::LockConfig;
use crate::engine::FatalCallback;
use crate::error::{AdapterError, LockError};
use crate::mutation::{self, LockOwnershipCheck};
use crate::v1::V1Lock;
use crate::v2::V2Lock;

/// Selects which reserved-key scheme a locked mutation is verified against.
/// Callers pick per-operation; the two schemes are never silently migrated
/// between for the same data key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    V1,
    V2,
}

struct V1OwnershipCheck<'a> {
    owner: &'a str,
}

impl LockOwnershipCheck for V1OwnershipCheck<'_> {
    fn check_owner(&self, record: &Record) -> Result<(), LockError> {
        let current = record.data.get(OWNER_KEY).map(String::as_str).unwrap_or("");
        if current == self.owner {
            Ok(())
        } else {
            Err(LockError::LockLost { key: None })
        }
    }
}

struct V2OwnershipCheck<'a> {
    owner: &'a str,
    key: &'a str,
}

impl LockOwnershipCheck for V2OwnershipCheck<'_> {
    fn check_owner(&self, record: &Record) -> Result<(), LockError> {
        let raw = record.data.get(LOCKS_KEY).map(String::as_str).unwrap_or("");
        let entries = parse_locks(raw).map_err(|e| LockError::MalformedLockData(e.to_string()))?;
        match entries.iter().find(|entry| entry.key == self.key) {
            Some(entry) if entry.owner == self.owner => Ok(()),
            _ => Err(LockError::LockLost {
                key: Some(self.key.to_string()),
            }),
        }
    }
}

/// A handle to one record carrying both lock schemes, plus the
/// locked-mutation operations that read/write arbitrary caller keys in it.
///
/// Cheap to clone: the v1 and v2 handles it wraps are themselves cheap
/// `Arc`-backed clones, and cloning shares the same in-process lock state.
#[derive(Clone)]
pub struct ConfigMapLock {
    store: Arc<dyn RecordStoreAdapter>,
    namespace: String,
    name: String,
    pub v1: V1Lock,
    pub v2: V2Lock,
}

impl ConfigMapLock {
    /// Creates the backing record if absent (an `AlreadyExists` from the
    /// store is not an error — the record persists across client restarts),
    /// seeds the v1 `owner` key empty for schema compatibility, and merges
    /// in any caller-supplied `initial_data`. Does not touch the `locks` or
    /// `generation` keys; a fresh record starts with no v2 keys held and
    /// generation `0`.
    pub async fn new(
        store: Arc<dyn RecordStoreAdapter>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        initial_data: BTreeMap<String, String>,
        v1_config: LockConfig,
        v2_config: LockConfig,
    ) -> Result<Self, LockError> {
        let namespace = namespace.into();
        let name = name.into();

        let mut record = Record::new(namespace.clone(), name.clone());
        record.data = initial_data;
        record.data.entry(OWNER_KEY.to_string()).or_insert_with(String::new);

        match store.create_record(record).await {
            Ok(_) | Err(AdapterError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let v1 = V1Lock::new(store.clone(), namespace.clone(), name.clone(), v1_config);
        let v2 = V2Lock::new(store.clone(), namespace.clone(), name.clone(), v2_config);

        Ok(Self {
            store,
            namespace,
            name,
            v1,
            v2,
        })
    }

    /// Composes a record name from a fixed `prefix` and an external cluster
    /// identifier, matching the Go source's `GetName`.
    #[must_use]
    pub fn name_for_cluster(prefix: &str, cluster_id: &str) -> String {
        compose_name(prefix, cluster_id)
    }

    /// Installs `cb` as the hold-timeout supervisor for both schemes.
    pub fn set_fatal_callback(&self, cb: FatalCallback) {
        self.v1.set_fatal_callback(cb.clone());
        self.v2.set_fatal_callback(cb);
    }

    /// Reads the record as it currently stands, without consulting
    /// in-process lock state.
    pub async fn get(&self) -> Result<Record, LockError> {
        Ok(self.store.get_record(&self.namespace, &self.name).await?)
    }

    /// Removes the backing record entirely. Any live refresh tasks for
    /// either scheme keep running against a now-missing record and will
    /// fail their next tick with a transport `NotFound`; callers should
    /// `release`/`unlock_with_key` first.
    pub async fn delete(&self) -> Result<(), LockError> {
        self.store.delete_record(&self.namespace, &self.name).await?;
        Ok(())
    }

    /// Sets `key` to `value`, verifying `owner` still holds the lock under
    /// `scheme` at the moment of the write. An empty `owner` is rejected
    /// immediately as `LockCheckFailed(EmptyOwner)`, never reaching the
    /// store.
    pub async fn patch_key_locked(
        &self,
        scheme: Scheme,
        owner: &str,
        key: &str,
        value: &str,
    ) -> Result<(), LockError> {
        if owner.is_empty() {
            return Err(LockError::LockCheckFailed(Box::new(LockError::EmptyOwner)));
        }
        match scheme {
            Scheme::V1 => {
                let check = V1OwnershipCheck { owner };
                mutation::patch_key_locked(self.store.as_ref(), &self.namespace, &self.name, &check, key, value).await
            }
            Scheme::V2 => {
                let check = V2OwnershipCheck { owner, key };
                mutation::patch_key_locked(self.store.as_ref(), &self.namespace, &self.name, &check, key, value).await
            }
        }
    }

    /// Removes `key`, under the same ownership discipline as
    /// [`Self::patch_key_locked`].
    pub async fn delete_key_locked(&self, scheme: Scheme, owner: &str, key: &str) -> Result<(), LockError> {
        if owner.is_empty() {
            return Err(LockError::LockCheckFailed(Box::new(LockError::EmptyOwner)));
        }
        match scheme {
            Scheme::V1 => {
                let check = V1OwnershipCheck { owner };
                mutation::delete_key_locked(self.store.as_ref(), &self.namespace, &self.name, &check, key).await
            }
            Scheme::V2 => {
                let check = V2OwnershipCheck { owner, key };
                mutation::delete_key_locked(self.store.as_ref(), &self.namespace, &self.name, &check, key).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_adapter::InMemoryRecordStore;

    async fn fresh_client() -> ConfigMapLock {
        let store: Arc<dyn RecordStoreAdapter> = Arc::new(InMemoryRecordStore::new());
        ConfigMapLock::new(
            store,
            "kube-system",
            "px-lock",
            BTreeMap::new(),
            LockConfig::v1_default(),
            LockConfig::v2_default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn new_seeds_an_empty_v1_owner_slot() {
        let client = fresh_client().await;
        let record = client.get().await.unwrap();
        assert_eq!(record.data.get(OWNER_KEY), Some(&String::new()));
    }

    #[tokio::test]
    async fn new_is_idempotent_across_restarts() {
        let store: Arc<dyn RecordStoreAdapter> = Arc::new(InMemoryRecordStore::new());
        let first = ConfigMapLock::new(
            store.clone(),
            "kube-system",
            "px-lock",
            BTreeMap::new(),
            LockConfig::v1_default(),
            LockConfig::v2_default(),
        )
        .await
        .unwrap();
        first
            .v1
            .lock("node-a")
            .await
            .expect("v1 lock should acquire on the first client");

        // A second `New` against the same backing record must not error
        // out on `AlreadyExists`, and must not clobber state set since.
        let second = ConfigMapLock::new(
            store,
            "kube-system",
            "px-lock",
            BTreeMap::new(),
            LockConfig::v1_default(),
            LockConfig::v2_default(),
        )
        .await
        .unwrap();
        let record = second.get().await.unwrap();
        assert_eq!(record.data.get(OWNER_KEY), Some(&"node-a".to_string()));
    }

    #[tokio::test]
    async fn patch_v1_locked_succeeds_for_the_current_holder() {
        let client = fresh_client().await;
        client.v1.lock("node-a").await.unwrap();

        client
            .patch_key_locked(Scheme::V1, "node-a", "replicas", "3")
            .await
            .unwrap();
        let record = client.get().await.unwrap();
        assert_eq!(record.data.get("replicas"), Some(&"3".to_string()));
    }

    #[tokio::test]
    async fn patch_v1_locked_fails_for_a_non_holder() {
        let client = fresh_client().await;
        client.v1.lock("node-a").await.unwrap();

        let err = client
            .patch_key_locked(Scheme::V1, "node-b", "replicas", "3")
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::LockCheckFailed(_)));
    }

    #[tokio::test]
    async fn patch_v2_locked_round_trips_and_bumps_generation() {
        let client = fresh_client().await;
        client.v2.lock_with_key("node-a", "migration").await.unwrap();

        client
            .patch_key_locked(Scheme::V2, "node-a", "migration", "v1")
            .await
            .unwrap();
        let record = client.get().await.unwrap();
        assert_eq!(record.data.get("migration"), Some(&"v1".to_string()));
        assert_eq!(record.data.get(cmaplock_core::GENERATION_KEY), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn patch_v2_locked_detects_a_lock_lost_to_another_owner() {
        let client = fresh_client().await;
        client.v2.lock_with_key("node-a", "migration").await.unwrap();

        // An external writer overwrites `locks` to hand `migration` to `B`.
        let mut record = client.get().await.unwrap();
        let far_future = chrono::Utc::now() + chrono::Duration::hours(1);
        let entries = vec![cmaplock_core::V2LockEntry {
            owner: "node-b".to_string(),
            key: "migration".to_string(),
            expiration: far_future,
        }];
        record
            .data
            .insert(LOCKS_KEY.to_string(), cmaplock_core::serialize_locks(&entries).unwrap());
        client.store.update_record(record).await.unwrap();

        let err = client
            .patch_key_locked(Scheme::V2, "node-a", "migration", "x")
            .await
            .unwrap_err();
        match err {
            LockError::LockCheckFailed(cause) => assert!(matches!(*cause, LockError::LockLost { .. })),
            other => panic!("expected LockCheckFailed(LockLost), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn patch_locked_rejects_an_empty_owner() {
        let client = fresh_client().await;
        let err = client
            .patch_key_locked(Scheme::V1, "", "replicas", "3")
            .await
            .unwrap_err();
        match err {
            LockError::LockCheckFailed(cause) => assert!(matches!(*cause, LockError::EmptyOwner)),
            other => panic!("expected LockCheckFailed(EmptyOwner), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_key_locked_removes_the_key_under_ownership() {
        let client = fresh_client().await;
        client.v2.lock_with_key("node-a", "migration").await.unwrap();
        client
            .patch_key_locked(Scheme::V2, "node-a", "migration", "v1")
            .await
            .unwrap();

        client
            .delete_key_locked(Scheme::V2, "node-a", "migration")
            .await
            .unwrap();
        let record = client.get().await.unwrap();
        assert!(!record.data.contains_key("migration"));
    }

    #[test]
    fn name_for_cluster_uses_the_shared_naming_helper() {
        assert_eq!(ConfigMapLock::name_for_cluster("px-lock-", "My_Cluster"), "px-lock-mycluster");
    }
}
