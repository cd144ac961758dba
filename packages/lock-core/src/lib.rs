//! Pure data model for the config-record distributed lock.
//!
//! This crate has no async runtime dependency and performs no I/O. It holds
//! the record shape, the reserved-key constants both lock schemes agree on,
//! the v2 multi-key lock entry and its JSON encoding, the generation
//! counter, and the naming helpers used to bootstrap a record name from a
//! cluster identifier. The engine that actually acquires and refreshes
//! locks against a live store lives in the `cmaplock` crate, which depends
//! on this one.

mod error;
mod generation;
mod naming;
mod record;
mod v2_entry;

pub use error::ParseError;
pub use generation::{next_generation, parse_generation};
pub use naming::{compose_name, truncate_label};
pub use record::{Record, EXPIRATION_KEY, GENERATION_KEY, LOCKS_KEY, OWNER_KEY, RESERVED_KEYS};
pub use v2_entry::{parse_locks, serialize_locks, V2LockEntry};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn a_record_round_trips_a_v2_lock_entry_through_its_data_map() {
        let entry = V2LockEntry {
            owner: "node-a".into(),
            key: "migration".into(),
            expiration: Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap(),
        };
        let mut record = Record::new("kube-system", "px-lock-mycluster");
        record
            .data
            .insert(LOCKS_KEY.to_string(), serialize_locks(&[entry.clone()]).unwrap());

        let parsed = parse_locks(record.data.get(LOCKS_KEY).unwrap()).unwrap();
        assert_eq!(parsed, vec![entry]);
    }

    #[test]
    fn generation_starts_at_one_after_first_bump() {
        let current = parse_generation(None);
        assert_eq!(next_generation(current), 1);
    }
}
