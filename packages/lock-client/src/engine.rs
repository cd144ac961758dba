//! Shared pieces used by both lock schemes: the in-process `LiveLock`
//! bookkeeping for a lock this process currently holds, and the
//! replaceable hold-timeout callback.
//!
//! The done-signal is a `tokio::sync::watch::channel(bool)`, the same
//! primitive the teacher uses for its shutdown signal
//! (`network/shutdown.rs::ShutdownController`): cheap to clone, observable
//! by a background task via `.changed()`, and idempotent to re-send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Invoked (from the refresh task only) when a held lock has been held
/// past its configured hold timeout. The default implementation logs and
/// aborts the process; this is a notification hook, not an
/// auto-release — the caller decides whether holding past the timeout is
/// actually fatal for their process.
pub type FatalCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[must_use]
pub fn default_fatal_callback() -> FatalCallback {
    Arc::new(|reason: &str| {
        tracing::error!(reason, "lock held past its configured hold timeout");
        std::process::abort();
    })
}

/// Tracks one lock this process currently believes it holds, coordinating
/// the background refresh task with the `Release`/re-acquire path.
///
/// Never consulted to make cross-process locking decisions — those always
/// go through the backing record. This only arbitrates between *this
/// process's own* refresh task and its own callers.
pub struct LiveLock {
    pub owner: String,
    done_tx: watch::Sender<bool>,
    unlocked: Mutex<bool>,
    pub refreshing: AtomicBool,
}

impl LiveLock {
    /// Creates a new live-lock record for `owner`, returning it alongside
    /// the receiver a refresh task should watch for the done signal.
    pub fn new(owner: String) -> (Arc<Self>, watch::Receiver<bool>) {
        let (done_tx, done_rx) = watch::channel(false);
        let live = Arc::new(Self {
            owner,
            done_tx,
            unlocked: Mutex::new(false),
            refreshing: AtomicBool::new(false),
        });
        (live, done_rx)
    }

    /// Signals the refresh task to stop. Idempotent: a second call is a
    /// no-op, matching the Go source's `unlocked` guard around closing
    /// `done`.
    pub fn signal_done(&self) {
        let mut unlocked = self.unlocked.lock();
        if *unlocked {
            return;
        }
        *unlocked = true;
        let _ = self.done_tx.send(true);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.unlocked.lock()
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}

impl Drop for LiveLock {
    fn drop(&mut self) {
        self.signal_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_done_is_idempotent() {
        let (live, mut done_rx) = LiveLock::new("node-a".to_string());
        assert!(!live.is_done());
        live.signal_done();
        live.signal_done();
        assert!(live.is_done());
        assert!(*done_rx.borrow_and_update());
    }

    #[test]
    fn refreshing_flag_round_trips() {
        let (live, _rx) = LiveLock::new("node-a".to_string());
        assert!(!live.is_refreshing());
        live.refreshing.store(true, Ordering::SeqCst);
        assert!(live.is_refreshing());
    }
}
