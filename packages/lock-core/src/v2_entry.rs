//! The v2 multi-key lock scheme's on-record representation.
//!
//! v2 locks for every key in a record share one reserved slot
//! ([`crate::record::LOCKS_KEY`]) holding a JSON array of [`V2LockEntry`]
//! values, one per currently-held key. This mirrors the Go source's
//! `lockData` struct and its `generateConfigMapData`/`parseLocks` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One held lock within the `locks` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2LockEntry {
    pub owner: String,
    pub key: String,
    pub expiration: DateTime<Utc>,
}

/// Parses the `locks` reserved key's raw string into its entries.
///
/// An absent or empty value is not malformed; it simply means no key is
/// currently locked, so it decodes to an empty vector rather than an error.
pub fn parse_locks(raw: &str) -> Result<Vec<V2LockEntry>, ParseError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Encodes a set of lock entries back into the `locks` reserved key's raw
/// string form.
pub fn serialize_locks(entries: &[V2LockEntry]) -> Result<String, ParseError> {
    Ok(serde_json::to_string(entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_entry() -> V2LockEntry {
        V2LockEntry {
            owner: "node-a".into(),
            key: "migration".into(),
            expiration: Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_raw_parses_to_empty_vec() {
        assert_eq!(parse_locks("").unwrap(), Vec::new());
        assert_eq!(parse_locks("   ").unwrap(), Vec::new());
    }

    #[test]
    fn round_trips_through_json() {
        let entries = vec![sample_entry()];
        let raw = serialize_locks(&entries).unwrap();
        let parsed = parse_locks(&raw).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse_locks("{not valid json").unwrap_err();
        assert!(matches!(err, ParseError::Locks(_)));
    }
}
