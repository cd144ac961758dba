//! The record model shared by every lock scheme.
//!
//! A [`Record`] is the payload of a single logical document in the external
//! key-value store (the orchestrator's config-map). The core only ever reads
//! and writes the four reserved keys below; everything else in `data` is
//! caller-owned.

use std::collections::BTreeMap;

/// Key holding the v1 lock's owner (`""` = vacant).
pub const OWNER_KEY: &str = "owner";
/// Key holding the v1 lock's absolute expiration, formatted per [`crate::naming`].
pub const EXPIRATION_KEY: &str = "expiration";
/// Key holding the JSON-encoded array of v2 lock entries.
pub const LOCKS_KEY: &str = "locks";
/// Key holding the monotonic generation counter.
pub const GENERATION_KEY: &str = "generation";

/// The four keys the core reads and writes. Callers must not use these for
/// their own data.
pub const RESERVED_KEYS: [&str; 4] = [OWNER_KEY, EXPIRATION_KEY, LOCKS_KEY, GENERATION_KEY];

/// A single logical record in the external store, identified by
/// `(namespace, name)`.
///
/// `resource_version` is opaque to the core; it exists purely so a
/// [`RecordStoreAdapter`](crate) implementation can detect that the record
/// changed since it was last read and fail the write with `Conflict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub namespace: String,
    pub name: String,
    pub data: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

impl Record {
    /// Creates a new, empty record for `(namespace, name)`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
            resource_version: None,
        }
    }

    /// Whether `key` is one of the four reserved keys.
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        RESERVED_KEYS.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_no_data_and_no_version() {
        let record = Record::new("kube-system", "px-lock");
        assert_eq!(record.namespace, "kube-system");
        assert_eq!(record.name, "px-lock");
        assert!(record.data.is_empty());
        assert!(record.resource_version.is_none());
    }

    #[test]
    fn reserved_keys_are_recognized() {
        assert!(Record::is_reserved("owner"));
        assert!(Record::is_reserved("expiration"));
        assert!(Record::is_reserved("locks"));
        assert!(Record::is_reserved("generation"));
        assert!(!Record::is_reserved("my-data-key"));
    }
}
