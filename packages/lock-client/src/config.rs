//! Tunables for a lock scheme, grounded on the teacher's config-struct
//! pattern (`service/config.rs::ServerConfig`,
//! `storage/impls/default_record_store.rs::StorageConfig`): a plain struct
//! with a `Default` impl, constructed once and shared behind an `Arc`.

use std::time::Duration;

/// Bounded internal CAS-conflict retry budget for a single locked
/// operation (acquire, refresh tick, or `PatchKeyLocked`/`DeleteKeyLocked`),
/// matching the Go source's `maxConflictRetries`.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Delay between outer lock-acquire attempts, matching the Go source's
/// `lockSleepDuration`.
pub const LOCK_SLEEP: Duration = Duration::from_secs(1);

/// Number of outer lock-acquire attempts the Go source defaults to
/// (`DefaultK8sLockAttempts`). Kept as a default rather than a hardcoded
/// bound; callers needing a tighter or looser budget set
/// `LockConfig::lock_attempts` directly.
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 300;

/// Per-scheme timing configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long a held lock remains valid without a refresh.
    pub ttl: Duration,
    /// How often the background refresh task renews the lease. Should be
    /// comfortably shorter than `ttl`.
    pub refresh_interval: Duration,
    /// Outer acquire-retry attempt budget.
    pub lock_attempts: u32,
    /// Delay between outer acquire-retry attempts.
    pub lock_sleep: Duration,
}

impl LockConfig {
    /// Defaults matching the Go source's v1 constants
    /// (`v1DefaultK8sLockTTL`, `v1DefaultK8sLockRefreshDuration`).
    #[must_use]
    pub fn v1_default() -> Self {
        Self {
            ttl: Duration::from_secs(16),
            refresh_interval: Duration::from_secs(8),
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_sleep: LOCK_SLEEP,
        }
    }

    /// Defaults matching the Go source's v2 constants
    /// (`v2DefaultK8sLockTTL`, `v2DefaultK8sLockRefreshDuration`).
    #[must_use]
    pub fn v2_default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(20),
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_sleep: LOCK_SLEEP,
        }
    }

    /// The overall deadline for an acquire loop: attempts times the delay
    /// between them, plus one ttl's worth of slack for the final attempt's
    /// own CAS round-trip.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.lock_sleep * self.lock_attempts + self.ttl
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::v1_default()
    }
}
