//! The distributed config-record lock engine: a cooperative
//! mutual-exclusion primitive whose only state lives in a single record in
//! an external key-value store.
//!
//! Two schemes share one record (partitioned by reserved key, never
//! migrated between): [`v1::V1Lock`] is a single-slot lock; [`v2::V2Lock`]
//! is a multi-key lock where independent keys within the same record can be
//! held by independent owners. [`client::ConfigMapLock`] bootstraps the
//! backing record and ties both schemes together with the
//! [`mutation::patch_key_locked`]/[`mutation::delete_key_locked`]
//! lock-protected compare-and-swap helpers.
//!
//! Depends on [`cmaplock_core`] for the record shape, reserved-key
//! constants, v2 entry encoding, the generation counter, and naming
//! helpers. No concrete record store ships beyond
//! [`memory_adapter::InMemoryRecordStore`] (tests, single-process use, and
//! the reference a real REST-backed [`adapter::RecordStoreAdapter`] should
//! match) — talking to a live orchestrator is the caller's job, kept
//! strictly out of scope here.

mod adapter;
mod client;
mod config;
mod engine;
mod error;
mod memory_adapter;
mod mutation;
mod retry;
mod v1;
mod v2;

pub use adapter::RecordStoreAdapter;
pub use client::{ConfigMapLock, Scheme};
pub use config::{LockConfig, DEFAULT_LOCK_ATTEMPTS, LOCK_SLEEP, MAX_CONFLICT_RETRIES};
pub use engine::{default_fatal_callback, FatalCallback};
pub use error::{AdapterError, LockError};
pub use memory_adapter::InMemoryRecordStore;
pub use mutation::{delete_key_locked, patch_key_locked, LockOwnershipCheck};
pub use retry::{retry_with_timeout, Step};
pub use v1::V1Lock;
pub use v2::V2Lock;
