//! Shared test helpers — available to all `#[cfg(test)]` modules in the crate.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::{Clock, Sleep};
use crate::config::SyncOptions;
use crate::storage::models::AuthState;
use crate::storage::{MemoryStorage, StorageAdapter, StorageError};
use crate::sync::AuthSync;

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// In-memory storage whose operations can be switched to fail.
#[derive(Clone, Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    fail_get: Arc<AtomicBool>,
    fail_set: Arc<AtomicBool>,
    fail_remove: Arc<AtomicBool>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }
}

impl StorageAdapter for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("reads disabled".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded {
                len: value.len(),
                quota: 0,
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("removes disabled".to_string()));
        }
        self.inner.remove(key)
    }
}

/// The signed-in state used across tests.
pub fn sample_state() -> AuthState {
    AuthState::authenticated("u1", "tok", 0)
}

/// A listener that records every notification it receives.
pub fn recorder() -> (
    Arc<Mutex<Vec<Option<AuthState>>>>,
    impl Fn(Option<&AuthState>) + Send + Sync + 'static,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |state: Option<&AuthState>| {
        sink.lock().push(state.cloned())
    })
}

/// A manager over fresh memory storage with a manual clock at zero.
///
/// 50 ms poll interval, 1 s max age. Outside a tokio runtime no poller runs,
/// so tests drive rounds with `poll_once`.
pub fn test_manager() -> (Arc<AuthSync>, MemoryStorage, ManualClock) {
    let storage = MemoryStorage::new();
    let clock = ManualClock::new(0);
    let manager = AuthSync::new(
        Arc::new(storage.clone()),
        Arc::new(clock.clone()),
        SyncOptions::new(Duration::from_millis(50), Duration::from_millis(1_000)),
    );
    (manager, storage, clock)
}
