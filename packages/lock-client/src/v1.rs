//! The v1 lock scheme: a single `owner`/`expiration` slot per record.
//!
//! Ported from `configmap_lock_v1.go`'s `tryLockV1`/`refreshLockV1`/
//! `Unlock`: the same-owner refresh path simply bumps the expiry, an
//! unexpired foreign owner is rejected, and an expired foreign owner is
//! reclaimed. No goroutine/task bookkeeping gates re-acquisition here —
//! that special case belongs to v2 only.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use cmaplock_core::{Record, EXPIRATION_KEY, OWNER_KEY};

use crate::adapter::RecordStoreAdapter;
use crate::config::{LockConfig, MAX_CONFLICT_RETRIES};
use crate::engine::{default_fatal_callback, FatalCallback, LiveLock};
use crate::error::{AdapterError, LockError};
use crate::retry::{retry_with_timeout, Step};

/// Format string mirroring Go's `time.UnixDate`, with the zone spelled out
/// literally since every timestamp this scheme writes is UTC.
const V1_TIME_FORMAT: &str = "%a %b %e %H:%M:%S UTC %Y";

fn format_v1_expiration(at: DateTime<Utc>) -> String {
    at.format(V1_TIME_FORMAT).to_string()
}

fn parse_v1_expiration(raw: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(raw, V1_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

struct Inner {
    store: Arc<dyn RecordStoreAdapter>,
    namespace: String,
    name: String,
    config: LockConfig,
    live: Mutex<Option<Arc<LiveLock>>>,
    fatal_cb: Mutex<FatalCallback>,
}

impl Inner {
    /// One CAS decision-and-write round, matching `tryLockV1(id, refresh)`.
    /// `refresh` distinguishes a background refresh tick from a plain
    /// `Acquire`: only a refresh tick may bypass the expiry check for a
    /// same-owner record, since it is extending a lease this process
    /// already holds rather than taking one out fresh. Internally bounded
    /// by `MAX_CONFLICT_RETRIES` for CAS conflicts; does not sleep between
    /// those retries, mirroring the Go source's immediate retry.
    async fn try_lock(&self, owner: &str, refresh: bool) -> Result<(), LockError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut record = self.store.get_record(&self.namespace, &self.name).await?;
            let current_owner = record.data.get(OWNER_KEY).cloned().unwrap_or_default();
            let now = Utc::now();

            let same_owner = !current_owner.is_empty() && current_owner == owner;
            if !current_owner.is_empty() && !(refresh && same_owner) {
                let expires_at = record
                    .data
                    .get(EXPIRATION_KEY)
                    .and_then(|raw| parse_v1_expiration(raw))
                    .unwrap_or(now);
                if expires_at > now {
                    return Err(LockError::Locked {
                        owner: current_owner,
                        expires_at,
                    });
                }
                // expired: falls through and reclaims below
            }

            let new_expiration = now + self.config.ttl;
            record.data.insert(OWNER_KEY.to_string(), owner.to_string());
            record
                .data
                .insert(EXPIRATION_KEY.to_string(), format_v1_expiration(new_expiration));

            match self.store.update_record(record).await {
                Ok(_) => return Ok(()),
                Err(AdapterError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LockError::ConflictRetriesExhausted)
    }

    /// The refresh task's per-tick call: identical CAS decision to
    /// `try_lock`, but a foreign unexpired owner means this process no
    /// longer holds the lock at all, not merely lost a race to acquire it.
    async fn refresh_tick(&self, owner: &str) -> Result<(), LockError> {
        match self.try_lock(owner, true).await {
            Err(LockError::Locked { .. }) => Err(LockError::LockLost { key: None }),
            other => other,
        }
    }
}

/// A handle to the v1 lock on one record. Cheap to clone; clones share the
/// same in-process refresh state.
#[derive(Clone)]
pub struct V1Lock(Arc<Inner>);

impl V1Lock {
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
            live: Mutex::new(None),
            fatal_cb: Mutex::new(default_fatal_callback()),
        }))
    }

    pub fn set_fatal_callback(&self, cb: FatalCallback) {
        *self.0.fatal_cb.lock() = cb;
    }

    /// Acquires the lock with no hold-timeout supervision.
    pub async fn lock(&self, owner: &str) -> Result<(), LockError> {
        self.lock_with_hold_timeout(owner, None).await
    }

    /// Acquires the lock, retrying up to `config.lock_attempts` times with
    /// `config.lock_sleep` between attempts, then spawns the background
    /// refresh task. If `hold_timeout` is set, the refresh task invokes the
    /// fatal callback (once) if the lock is still held past that duration.
    pub async fn lock_with_hold_timeout(
        &self,
        owner: &str,
        hold_timeout: Option<Duration>,
    ) -> Result<(), LockError> {
        let owner = owner.to_string();
        let inner = self.0.clone();
        let attempt_owner = owner.clone();

        retry_with_timeout(
            self.0.config.lock_attempts,
            self.0.config.lock_sleep,
            self.0.config.acquire_timeout(),
            move || {
                let inner = inner.clone();
                let owner = attempt_owner.clone();
                async move {
                    match inner.try_lock(&owner, false).await {
                        Ok(()) => Step::Done(()),
                        Err(LockError::Locked { owner: current, expires_at }) => {
                            Step::Retry(format!("locked by {current} until {expires_at}"))
                        }
                        Err(e) => Step::Fatal(e),
                    }
                }
            },
        )
        .await?;

        let old = self.0.live.lock().take();
        if let Some(old) = old {
            old.signal_done();
        }

        let (live, done_rx) = LiveLock::new(owner.clone());
        *self.0.live.lock() = Some(live.clone());

        let refresh_handle = self.clone();
        tokio::spawn(async move {
            refresh_handle.run_refresh(owner, hold_timeout, done_rx, live).await;
        });

        Ok(())
    }

    async fn run_refresh(
        self,
        owner: String,
        hold_timeout: Option<Duration>,
        mut done_rx: watch::Receiver<bool>,
        live: Arc<LiveLock>,
    ) {
        let mut ticker = tokio::time::interval(self.0.config.refresh_interval);
        ticker.tick().await; // first tick is immediate; we just acquired
        let acquired_at = Instant::now();
        let mut hold_timeout_notified = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    live.refreshing.store(true, Ordering::SeqCst);
                    let tick_started = Instant::now();
                    match self.0.refresh_tick(&owner).await {
                        Ok(()) => {}
                        Err(LockError::LockLost { .. }) => {
                            tracing::warn!(owner = %owner, "lock lost during refresh, stopping refresh task");
                            live.refreshing.store(false, Ordering::SeqCst);
                            break;
                        }
                        Err(error) => {
                            tracing::error!(owner = %owner, %error, "error refreshing lock, will retry next tick");
                        }
                    }
                    live.refreshing.store(false, Ordering::SeqCst);

                    let elapsed = tick_started.elapsed();
                    if elapsed > self.0.config.refresh_interval.mul_f64(1.5) {
                        tracing::warn!(owner = %owner, ?elapsed, "lock refresh took longer than expected");
                    }

                    if let Some(hold_timeout) = hold_timeout {
                        if !hold_timeout_notified && acquired_at.elapsed() > hold_timeout {
                            hold_timeout_notified = true;
                            let callback = self.0.fatal_cb.lock().clone();
                            callback(&format!(
                                "lock on {}/{} held past its {:?} hold timeout",
                                self.0.namespace, self.0.name, hold_timeout
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

    /// Releases the lock if `owner` currently holds it, stopping this
    /// process's refresh task. A no-op (not an error) if the record shows
    /// a different owner, matching the Go source's tolerant `Unlock`.
    pub async fn unlock(&self, owner: &str) -> Result<(), LockError> {
        if let Some(live) = self.0.live.lock().take() {
            live.signal_done();
        }

        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut record = self.0.store.get_record(&self.0.namespace, &self.0.name).await?;
            let current_owner = record.data.get(OWNER_KEY).cloned().unwrap_or_default();
            if current_owner != owner {
                return Ok(());
            }

            record.data.insert(OWNER_KEY.to_string(), String::new());
            record.data.remove(EXPIRATION_KEY);

            match self.0.store.update_record(record).await {
                Ok(_) => return Ok(()),
                Err(AdapterError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LockError::ConflictRetriesExhausted)
    }

    /// Reads the current owner directly from the record, without consulting
    /// in-process state. Empty string means vacant.
    pub async fn current_owner(&self) -> Result<String, LockError> {
        let record: Record = self.0.store.get_record(&self.0.namespace, &self.0.name).await?;
        Ok(record.data.get(OWNER_KEY).cloned().unwrap_or_default())
    }
}
