//! The v2 lock scheme: many independently-held locks, one per `key`,
//! sharing the single `locks` reserved key as a JSON array.
//!
//! Ported from `configmap_lock_v2.go`'s `checkAndTakeLock`/`tryLock`/
//! `refreshLock`/`UnlockWithKey`/`IsKeyLocked`. The distinguishing feature
//! over v1 is the "post-restart" re-acquire case: a caller claiming the
//! same owner name as the current unexpired holder may take over *without*
//! waiting for expiry, but only if this process has no refresh task
//! currently running for that key — i.e. the previous holder was a
//! different process instance (or this one after a restart), not a peer
//! still actively refreshing.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use cmaplock_core::{parse_locks, serialize_locks, Record, V2LockEntry, LOCKS_KEY};

use crate::adapter::RecordStoreAdapter;
use crate::config::{LockConfig, MAX_CONFLICT_RETRIES};
use crate::engine::{default_fatal_callback, FatalCallback, LiveLock};
use crate::error::{AdapterError, LockError};
use crate::retry::{retry_with_timeout, Step};

struct Inner {
    store: Arc<dyn RecordStoreAdapter>,
    namespace: String,
    name: String,
    config: LockConfig,
    live: Mutex<HashMap<String, Arc<LiveLock>>>,
    fatal_cb: Mutex<FatalCallback>,
}

impl Inner {
    fn parse_entries(&self, record: &Record) -> Result<Vec<V2LockEntry>, LockError> {
        let raw = record.data.get(LOCKS_KEY).map(String::as_str).unwrap_or("");
        parse_locks(raw).map_err(|e| LockError::MalformedLockData(e.to_string()))
    }

    fn write_entries(&self, record: &mut Record, entries: &[V2LockEntry]) -> Result<(), LockError> {
        let raw = serialize_locks(entries).map_err(|e| LockError::MalformedLockData(e.to_string()))?;
        record.data.insert(LOCKS_KEY.to_string(), raw);
        Ok(())
    }

    fn is_refreshing(&self, key: &str) -> bool {
        self.live
            .lock()
            .get(key)
            .is_some_and(|live| live.refreshing.load(Ordering::SeqCst))
    }

    /// The acquire-path CAS decision, matching `checkAndTakeLock`.
    async fn try_acquire(&self, owner: &str, key: &str) -> Result<(), LockError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut record = self.store.get_record(&self.namespace, &self.name).await?;
            let mut entries = self.parse_entries(&record)?;
            let now = Utc::now();

            if let Some(idx) = entries.iter().position(|e| e.key == key) {
                let existing = entries[idx].clone();
                if existing.expiration > now {
                    let reacquire_allowed = existing.owner == owner && !self.is_refreshing(key);
                    if !reacquire_allowed {
                        return Err(LockError::Locked {
                            owner: existing.owner,
                            expires_at: existing.expiration,
                        });
                    }
                }
                entries.remove(idx);
            }

            entries.push(V2LockEntry {
                owner: owner.to_string(),
                key: key.to_string(),
                expiration: now + self.config.ttl,
            });
            self.write_entries(&mut record, &entries)?;

            match self.store.update_record(record).await {
                Ok(_) => return Ok(()),
                Err(AdapterError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LockError::ConflictRetriesExhausted)
    }

    /// The refresh-task CAS decision, matching `tryLock`'s refresh branch:
    /// the owner must still match, or the lock is considered lost.
    async fn refresh_tick(&self, owner: &str, key: &str) -> Result<(), LockError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut record = self.store.get_record(&self.namespace, &self.name).await?;
            let mut entries = self.parse_entries(&record)?;

            let Some(idx) = entries.iter().position(|e| e.key == key) else {
                return Err(LockError::LockLost { key: Some(key.to_string()) });
            };
            if entries[idx].owner != owner {
                return Err(LockError::LockLost { key: Some(key.to_string()) });
            }
            entries[idx].expiration = Utc::now() + self.config.ttl;
            self.write_entries(&mut record, &entries)?;

            match self.store.update_record(record).await {
                Ok(_) => return Ok(()),
                Err(AdapterError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LockError::ConflictRetriesExhausted)
    }
}

/// A handle to the v2 multi-key lock on one record. Cheap to clone; clones
/// share the same in-process per-key refresh state.
#[derive(Clone)]
pub struct V2Lock(Arc<Inner>);

impl V2Lock {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStoreAdapter>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        config: LockConfig,
    ) -> Self {
        Self(Arc::new(Inner {
            store,
            namespace: namespace.into(),
            name: name.into(),
            config,
            live: Mutex::new(HashMap::new()),
            fatal_cb: Mutex::new(default_fatal_callback()),
        }))
    }

    pub fn set_fatal_callback(&self, cb: FatalCallback) {
        *self.0.fatal_cb.lock() = cb;
    }

    /// Acquires the lock on `key` with no hold-timeout supervision.
    pub async fn lock_with_key(&self, owner: &str, key: &str) -> Result<(), LockError> {
        self.lock_with_key_and_hold_timeout(owner, key, None).await
    }

    /// Acquires the lock on `key`, retrying up to `config.lock_attempts`
    /// times. Takes over any live refresh task this process already runs
    /// for `key` (closing its done signal, win or lose), then spawns a
    /// fresh one. If `hold_timeout` is set, the refresh task invokes the
    /// fatal callback (once) if `key` is still held past that duration.
    pub async fn lock_with_key_and_hold_timeout(
        &self,
        owner: &str,
        key: &str,
        hold_timeout: Option<Duration>,
    ) -> Result<(), LockError> {
        let inner = self.0.clone();
        let owner_owned = owner.to_string();
        let key_owned = key.to_string();

        retry_with_timeout(
            self.0.config.lock_attempts,
            self.0.config.lock_sleep,
            self.0.config.acquire_timeout(),
            move || {
                let inner = inner.clone();
                let owner = owner_owned.clone();
                let key = key_owned.clone();
                async move {
                    match inner.try_acquire(&owner, &key).await {
                        Ok(()) => Step::Done(()),
                        Err(LockError::Locked { owner: current, expires_at }) => {
                            Step::Retry(format!("key locked by {current} until {expires_at}"))
                        }
                        Err(e) => Step::Fatal(e),
                    }
                }
            },
        )
        .await?;

        let old = self.0.live.lock().remove(key);
        if let Some(old) = old {
            old.signal_done();
        }

        let (live, done_rx) = LiveLock::new(owner.to_string());
        self.0.live.lock().insert(key.to_string(), live.clone());

        let refresh_handle = self.clone();
        let owner_owned = owner.to_string();
        let key_owned = key.to_string();
        tokio::spawn(async move {
            refresh_handle
                .run_refresh(owner_owned, key_owned, hold_timeout, done_rx, live)
                .await;
        });

        Ok(())
    }

    async fn run_refresh(
        self,
        owner: String,
        key: String,
        hold_timeout: Option<Duration>,
        mut done_rx: watch::Receiver<bool>,
        live: Arc<LiveLock>,
    ) {
        let mut ticker = tokio::time::interval(self.0.config.refresh_interval);
        ticker.tick().await;
        let acquired_at = Instant::now();
        let mut hold_timeout_notified = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    live.refreshing.store(true, Ordering::SeqCst);
                    let tick_started = Instant::now();
                    match self.0.refresh_tick(&owner, &key).await {
                        Ok(()) => {}
                        Err(LockError::LockLost { .. }) => {
                            tracing::warn!(owner = %owner, key = %key, "lock lost during refresh, stopping refresh task");
                            live.refreshing.store(false, Ordering::SeqCst);
                            self.0.live.lock().remove(&key);
                            break;
                        }
                        Err(error) => {
                            tracing::error!(owner = %owner, key = %key, %error, "error refreshing lock, will retry next tick");
                        }
                    }
                    live.refreshing.store(false, Ordering::SeqCst);

                    let elapsed = tick_started.elapsed();
                    if elapsed > self.0.config.refresh_interval.mul_f64(1.5) {
                        tracing::warn!(owner = %owner, key = %key, ?elapsed, "lock refresh took longer than expected");
                    }

                    if let Some(hold_timeout) = hold_timeout {
                        if !hold_timeout_notified && acquired_at.elapsed() > hold_timeout {
                            hold_timeout_notified = true;
                            let callback = self.0.fatal_cb.lock().clone();
                            callback(&format!(
                                "lock on {}/{} key {key} held past its {hold_timeout:?} hold timeout",
                                self.0.namespace, self.0.name
                            ));
                        }
                    }
                }
                _ = done_rx.changed() => {
                    break;
                }
            }
        }
    }

    /// Releases `key` if `owner` currently holds it, stopping this
    /// process's refresh task for that key. A no-op if the record shows a
    /// different owner or no entry at all.
    pub async fn unlock_with_key(&self, owner: &str, key: &str) -> Result<(), LockError> {
        if let Some(live) = self.0.live.lock().remove(key) {
            live.signal_done();
        }

        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut record = self.0.store.get_record(&self.0.namespace, &self.0.name).await?;
            let mut entries = self.0.parse_entries(&record)?;

            let Some(idx) = entries.iter().position(|e| e.key == key) else {
                return Ok(());
            };
            if entries[idx].owner != owner {
                return Ok(());
            }
            entries.remove(idx);
            self.0.write_entries(&mut record, &entries)?;

            match self.0.store.update_record(record).await {
                Ok(_) => return Ok(()),
                Err(AdapterError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LockError::ConflictRetriesExhausted)
    }

    /// Checks whether `key` is currently held by someone other than
    /// `requester`. Returns `(false, "")` when vacant or expired, and
    /// `(false, owner)` for the post-restart case (same owner, no refresh
    /// task currently running), matching
    /// `ifRequesterIsLockOwnerWithoutGoroutine`.
    pub async fn is_key_locked(&self, requester: &str, key: &str) -> Result<(bool, String), LockError> {
        let record = self.0.store.get_record(&self.0.namespace, &self.0.name).await?;
        let entries = self.0.parse_entries(&record)?;
        let Some(entry) = entries.iter().find(|e| e.key == key) else {
            return Ok((false, String::new()));
        };
        if entry.expiration <= Utc::now() {
            return Ok((false, String::new()));
        }
        if entry.owner == requester && !self.0.is_refreshing(key) {
            return Ok((false, entry.owner.clone()));
        }
        Ok((true, entry.owner.clone()))
    }
}
