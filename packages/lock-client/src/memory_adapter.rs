//! A single-process, in-memory [`RecordStoreAdapter`], grounded on the
//! teacher's `HashMapStorage` engine (`storage/engines/hashmap.rs`): a
//! `parking_lot::Mutex`-guarded map with version checks performed inside
//! the lock.
//!
//! Suitable for tests, single-process callers, and as the reference
//! implementation a real store-backed adapter should match.

use std::collections::HashMap;

use async_trait::async_trait;
use cmaplock_core::Record;
use parking_lot::Mutex;

use crate::adapter::RecordStoreAdapter;
use crate::error::AdapterError;

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<(String, String), (Record, u64)>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStoreAdapter for InMemoryRecordStore {
    async fn get_record(&self, namespace: &str, name: &str) -> Result<Record, AdapterError> {
        let records = self.records.lock();
        records
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(record, version)| {
                let mut record = record.clone();
                record.resource_version = Some(version.to_string());
                record
            })
            .ok_or_else(|| AdapterError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create_record(&self, mut record: Record) -> Result<Record, AdapterError> {
        let mut records = self.records.lock();
        let key = (record.namespace.clone(), record.name.clone());
        if records.contains_key(&key) {
            return Err(AdapterError::AlreadyExists {
                namespace: record.namespace,
                name: record.name,
            });
        }
        record.resource_version = Some("1".to_string());
        records.insert(key, (record.clone(), 1));
        Ok(record)
    }

    async fn update_record(&self, mut record: Record) -> Result<Record, AdapterError> {
        let mut records = self.records.lock();
        let key = (record.namespace.clone(), record.name.clone());
        let Some((_, stored_version)) = records.get(&key) else {
            return Err(AdapterError::NotFound {
                namespace: record.namespace,
                name: record.name,
            });
        };

        let caller_version = record.resource_version.as_deref();
        if caller_version != Some(stored_version.to_string().as_str()) {
            return Err(AdapterError::Conflict {
                namespace: record.namespace,
                name: record.name,
            });
        }

        let next_version = stored_version + 1;
        record.resource_version = Some(next_version.to_string());
        records.insert(key, (record.clone(), next_version));
        Ok(record)
    }

    async fn delete_record(&self, namespace: &str, name: &str) -> Result<(), AdapterError> {
        let mut records = self.records.lock();
        let key = (namespace.to_string(), name.to_string());
        // A plain in-process `HashMap::remove` is already "foreground
        // propagation": the entry is gone before this call returns, under
        // the same mutex every other operation takes.
        match records.remove(&key) {
            Some(_) => Ok(()),
            None => Err(AdapterError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }
}
