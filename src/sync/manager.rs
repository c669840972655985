use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::listeners::{ListenerRegistry, Subscription};
use super::poller;
use crate::clock::Clock;
use crate::codec;
use crate::config::SyncOptions;
use crate::storage::models::{AuthState, StoredEnvelope};
use crate::storage::StorageAdapter;

/// Lifecycle of a manager instance. There is no way back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Destroyed,
}

/// Keeps one context's view of the auth state in step with shared storage.
///
/// Every public method is total: storage failures, malformed entries and
/// panicking listeners are logged and absorbed, and the caller sees either
/// the state or `None`.
pub struct AuthSync {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    /// Best-known state for this context
    cache: Mutex<Option<AuthState>>,
    listeners: Arc<ListenerRegistry>,
    poller: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl AuthSync {
    /// Build an active manager and start its poller on the current tokio runtime.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            storage,
            clock: Arc::clone(&clock),
            options,
            cache: Mutex::new(None),
            listeners: ListenerRegistry::new(),
            poller: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let handle = poller::spawn(Arc::downgrade(&manager), clock, manager.options.interval);
        *manager.poller.lock() = handle;

        debug!(
            key = %manager.options.storage_key,
            interval_ms = manager.options.interval.as_millis() as u64,
            max_age_ms = manager.options.max_age.as_millis() as u64,
            "auth_sync: manager started"
        );
        manager
    }

    /// Persist `state` and broadcast it to this context's listeners.
    ///
    /// The cache and listeners reflect `state` even when the write fails.
    pub fn set_auth_state(&self, state: AuthState) {
        {
            let mut cache = self.cache.lock();
            self.write(&state);
            if self.is_destroyed() {
                debug!("auth_sync: set on destroyed manager, persisted only");
                return;
            }
            *cache = Some(state.clone());
        }
        self.listeners.notify(Some(&state));
    }

    /// Read the current state from storage.
    ///
    /// Returns `None` when nothing is stored, storage fails, the entry is
    /// malformed, or it is older than `max_age`.
    pub fn get_auth_state(&self) -> Option<AuthState> {
        self.read_state()
    }

    /// Forget the user in every context: remove the entry and broadcast `None`.
    pub fn clear_auth_state(&self) {
        {
            let mut cache = self.cache.lock();
            self.remove();
            if self.is_destroyed() {
                debug!("auth_sync: clear on destroyed manager, removed entry only");
                return;
            }
            *cache = None;
        }
        self.listeners.notify(None);
    }

    /// Register `callback` for every observed change, local or from another context.
    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&AuthState>) + Send + Sync + 'static,
    {
        if self.is_destroyed() {
            warn!("auth_sync: listener registered on destroyed manager, ignoring");
            return Subscription::inert();
        }
        self.listeners.add(callback)
    }

    /// Stop participating in sync. Storage is left untouched.
    pub fn destroy(&self) {
        {
            // The flag flips under the cache lock so an in-flight write or
            // poll either finishes first or sees the manager as destroyed.
            let mut cache = self.cache.lock();
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return;
            }
            *cache = None;
        }

        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
        self.listeners.clear();

        debug!(key = %self.options.storage_key, "auth_sync: manager destroyed");
    }

    /// The in-memory view, without touching storage
    pub fn cached_state(&self) -> Option<AuthState> {
        self.cache.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_auth_state()
            .map(|state| state.is_authenticated())
            .unwrap_or(false)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.is_destroyed() {
            Lifecycle::Destroyed
        } else {
            Lifecycle::Active
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Whether storage calls may block on disk I/O
    pub(crate) fn storage_blocks(&self) -> bool {
        self.storage.is_blocking()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// One poll round: re-read storage and broadcast if it drifted from the cache.
    ///
    /// Returns whether listeners were notified.
    pub(crate) fn poll_once(&self) -> bool {
        let fresh = {
            let mut cache = self.cache.lock();
            if self.is_destroyed() {
                return false;
            }
            let fresh = self.read_state();
            if *cache == fresh {
                return false;
            }
            *cache = fresh.clone();
            fresh
        };

        debug!(
            authenticated = fresh.as_ref().map(|s| s.is_authenticated()).unwrap_or(false),
            "auth_sync: external change detected"
        );
        self.listeners.notify(fresh.as_ref());
        true
    }

    // ========================================================================
    // Guarded storage access
    // ========================================================================

    fn read_envelope(&self) -> Option<StoredEnvelope> {
        let key = &self.options.storage_key;

        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "auth_sync: storage read failed");
                return None;
            }
        };

        match codec::decode(&raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(key = %key, error = %e, "auth_sync: malformed envelope");
                None
            }
        }
    }

    fn read_state(&self) -> Option<AuthState> {
        let envelope = self.read_envelope()?;

        let age_ms = self
            .clock
            .now_millis()
            .saturating_sub(envelope.metadata.updated_at);
        if age_ms > self.options.max_age_millis() {
            debug!(
                key = %self.options.storage_key,
                age_ms,
                "auth_sync: stored state expired"
            );
            return None;
        }

        Some(envelope.state)
    }

    fn write(&self, state: &AuthState) {
        let key = &self.options.storage_key;
        let previous = self.read_envelope();

        let raw = match codec::encode(state, previous.as_ref(), self.clock.now_millis()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "auth_sync: storage write failed");
                return;
            }
        };

        if let Err(e) = self.storage.set(key, &raw) {
            warn!(key = %key, error = %e, "auth_sync: storage write failed");
        }
    }

    fn remove(&self) {
        let key = &self.options.storage_key;
        if let Err(e) = self.storage.remove(key) {
            warn!(key = %key, error = %e, "auth_sync: storage remove failed");
        }
    }
}

impl Drop for AuthSync {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for AuthSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSync")
            .field("options", &self.options)
            .field("lifecycle", &self.lifecycle())
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::codec::ENVELOPE_VERSION;
    use crate::storage::models::{AuthStatus, StateSource};
    use crate::storage::MemoryStorage;
    use crate::testutil::{recorder, sample_state, test_manager, FlakyStorage, ManualClock};

    #[test]
    fn test_round_trip() {
        let (manager, _storage, _clock) = test_manager();
        let state = sample_state();

        manager.set_auth_state(state.clone());

        assert_eq!(manager.get_auth_state(), Some(state.clone()));
        assert_eq!(manager.cached_state(), Some(state));
        assert!(manager.is_authenticated());
    }

    #[test]
    fn test_expiration_is_soft() {
        let (manager, storage, clock) = test_manager();
        manager.set_auth_state(sample_state());

        clock.advance(Duration::from_millis(1_000));
        assert!(manager.get_auth_state().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(manager.get_auth_state().is_none());
        assert!(!manager.is_authenticated());

        // Expired entries stay in storage until the next write or clear
        assert!(storage.get("auth_state").unwrap().is_some());
    }

    #[test]
    fn test_write_refreshes_updated_at_and_keeps_created_at() {
        let (manager, storage, clock) = test_manager();
        manager.set_auth_state(sample_state());

        clock.advance(Duration::from_millis(700));
        manager.set_auth_state(AuthState::unauthenticated(700));

        let raw = storage.get("auth_state").unwrap().unwrap();
        let envelope = codec::decode(&raw).unwrap();
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        assert_eq!(envelope.metadata.created_at, 0);
        assert_eq!(envelope.metadata.updated_at, 700);

        // The rewrite restarted the expiry window
        clock.advance(Duration::from_millis(700));
        assert_eq!(
            manager.get_auth_state(),
            Some(AuthState::unauthenticated(700))
        );
    }

    #[test]
    fn test_clear_removes_entry_and_notifies() {
        let (manager, storage, _clock) = test_manager();
        let (events, listener) = recorder();
        manager.on_state_change(listener);

        let state = sample_state();
        manager.set_auth_state(state.clone());
        manager.clear_auth_state();

        assert!(manager.get_auth_state().is_none());
        assert!(storage.get("auth_state").unwrap().is_none());
        assert!(manager.cached_state().is_none());
        assert_eq!(*events.lock(), vec![Some(state), None]);
    }

    #[test]
    fn test_listener_isolation() {
        let (manager, _storage, _clock) = test_manager();
        let (events, listener) = recorder();

        manager.on_state_change(|_| panic!("bad subscriber"));
        manager.on_state_change(listener);

        let state = sample_state();
        manager.set_auth_state(state.clone());

        assert_eq!(*events.lock(), vec![Some(state.clone())]);
        assert_eq!(manager.get_auth_state(), Some(state));
    }

    #[test]
    fn test_write_failure_still_updates_local_view() {
        let storage = FlakyStorage::new();
        storage.fail_sets(true);
        let clock = ManualClock::new(0);
        let manager = AuthSync::new(
            Arc::new(storage.clone()),
            Arc::new(clock),
            SyncOptions::new(Duration::from_millis(50), Duration::from_millis(1_000)),
        );
        let (events, listener) = recorder();
        manager.on_state_change(listener);

        let state = sample_state();
        manager.set_auth_state(state.clone());

        assert_eq!(*events.lock(), vec![Some(state.clone())]);
        assert_eq!(manager.cached_state(), Some(state));
        assert!(manager.get_auth_state().is_none());
    }

    #[test]
    fn test_quota_exceeded_is_swallowed() {
        let storage = MemoryStorage::with_quota(16);
        let manager = AuthSync::new(
            Arc::new(storage.clone()),
            Arc::new(ManualClock::new(0)),
            SyncOptions::default(),
        );

        let state = sample_state();
        manager.set_auth_state(state.clone());

        assert!(storage.is_empty());
        assert_eq!(manager.cached_state(), Some(state));
        assert!(manager.get_auth_state().is_none());
    }

    #[test]
    fn test_read_and_remove_failures_are_swallowed() {
        let storage = FlakyStorage::new();
        let manager = AuthSync::new(
            Arc::new(storage.clone()),
            Arc::new(ManualClock::new(0)),
            SyncOptions::default(),
        );
        manager.set_auth_state(sample_state());

        storage.fail_gets(true);
        assert!(manager.get_auth_state().is_none());

        storage.fail_removes(true);
        manager.clear_auth_state();
        assert!(manager.cached_state().is_none());

        // The entry survived the failed remove
        storage.fail_gets(false);
        assert!(manager.get_auth_state().is_some());
    }

    #[test]
    fn test_malformed_entries_read_as_absent() {
        let (manager, storage, _clock) = test_manager();

        for raw in [
            "garbage",
            "{}",
            "[]",
            r#"{"state":{"status":"authenticated","timestamp":1}}"#,
            r#"{"metadata":{"updatedAt":0}}"#,
            r#"{"state":null,"metadata":{"updatedAt":0}}"#,
            r#"{"state":{},"metadata":{"updatedAt":"later"}}"#,
        ] {
            storage.set("auth_state", raw).unwrap();
            assert!(manager.get_auth_state().is_none(), "accepted {raw}");
        }
    }

    #[test]
    fn test_incomplete_state_passes_through() {
        let (manager, storage, _clock) = test_manager();
        storage
            .set(
                "auth_state",
                r#"{"version":"9","state":{"status":"authenticated","timestamp":1,"source":"internal"},"metadata":{"updatedAt":0}}"#,
            )
            .unwrap();

        let state = manager.get_auth_state().unwrap();
        assert!(state.is_authenticated());
        assert!(state.user_id().is_none());
        assert!(state.session_token().is_none());
    }

    #[test]
    fn test_foreign_shapes_come_back_unchanged() {
        let (manager, storage, _clock) = test_manager();

        for state in [
            json!({"status": "authenticated", "timestamp": 1, "userId": 42}),
            json!({"timestamp": 1, "sessionToken": "tok"}),
            json!({"status": "authenticated", "timestamp": 1.5, "source": "internal"}),
        ] {
            let raw = json!({"version": "1", "state": state.clone(), "metadata": {"updatedAt": 0}});
            storage.set("auth_state", &raw.to_string()).unwrap();

            let read = manager.get_auth_state().expect("state should pass through");
            assert_eq!(read.as_value(), &state);
        }
    }

    #[test]
    fn test_round_trip_keeps_unknown_values() {
        let (manager, storage, _clock) = test_manager();
        let state = AuthState::from_value(json!({
            "status": "mfa_pending",
            "timestamp": 12,
            "userId": "u1",
            "source": "kiosk",
            "roles": ["admin"],
            "device": {"id": 7}
        }));

        manager.set_auth_state(state.clone());

        let read = manager.get_auth_state().unwrap();
        assert_eq!(read, state);
        assert_eq!(read.status(), Some(AuthStatus::Other("mfa_pending".to_string())));
        assert_eq!(read.source(), StateSource::Other("kiosk".to_string()));
        assert!(!manager.is_authenticated());

        let raw = storage.get("auth_state").unwrap().unwrap();
        let envelope = codec::decode(&raw).unwrap();
        assert_eq!(envelope.metadata.source, "kiosk");
    }

    #[test]
    fn test_destroy_racing_poll_and_set_leaves_empty_cache() {
        for _ in 0..200 {
            let (manager, storage, clock) = test_manager();
            let writer = AuthSync::new(
                Arc::new(storage.clone()),
                Arc::new(clock.clone()),
                SyncOptions::default(),
            );
            writer.set_auth_state(sample_state());
            let _subscription = manager.on_state_change(|_| {});
            let barrier = Barrier::new(3);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    manager.poll_once();
                });
                scope.spawn(|| {
                    barrier.wait();
                    manager.set_auth_state(AuthState::unauthenticated(1));
                });
                barrier.wait();
                manager.destroy();
            });

            assert_eq!(manager.lifecycle(), Lifecycle::Destroyed);
            assert!(manager.cached_state().is_none());
            assert_eq!(manager.listener_count(), 0);
            assert!(!manager.poll_once());
            assert!(manager.cached_state().is_none());
        }
    }

    #[test]
    fn test_poll_once_detects_drift() {
        let (manager, storage, clock) = test_manager();
        let (events, listener) = recorder();
        manager.on_state_change(listener);

        assert!(!manager.poll_once());

        let other = AuthSync::new(
            Arc::new(storage.clone()),
            Arc::new(clock.clone()),
            SyncOptions::default(),
        );
        let state = sample_state();
        other.set_auth_state(state.clone());

        assert!(manager.poll_once());
        assert!(!manager.poll_once());
        assert_eq!(manager.cached_state(), Some(state.clone()));

        other.clear_auth_state();
        assert!(manager.poll_once());

        assert_eq!(*events.lock(), vec![Some(state), None]);
    }

    #[test]
    fn test_poll_notices_expiry() {
        let (manager, _storage, clock) = test_manager();
        let (events, listener) = recorder();
        manager.on_state_change(listener);

        manager.set_auth_state(sample_state());
        clock.advance(Duration::from_millis(1_001));

        assert!(manager.poll_once());
        assert_eq!(events.lock().last(), Some(&None));
    }

    #[test]
    fn test_destroy_is_idempotent_and_keeps_storage() {
        let (manager, storage, _clock) = test_manager();
        let (events, listener) = recorder();
        manager.on_state_change(listener);
        manager.set_auth_state(sample_state());

        manager.destroy();
        manager.destroy();

        assert_eq!(manager.lifecycle(), Lifecycle::Destroyed);
        assert_eq!(manager.listener_count(), 0);
        assert!(manager.cached_state().is_none());
        assert!(storage.get("auth_state").unwrap().is_some());
        assert!(!manager.poll_once());
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_destroyed_manager_still_persists_but_stays_silent() {
        let (manager, storage, _clock) = test_manager();
        manager.destroy();

        let (events, listener) = recorder();
        let subscription = manager.on_state_change(listener);
        assert!(!subscription.unsubscribe());

        manager.set_auth_state(sample_state());
        assert!(storage.get("auth_state").unwrap().is_some());
        assert!(manager.cached_state().is_none());

        manager.clear_auth_state();
        assert!(storage.get("auth_state").unwrap().is_none());
        assert!(events.lock().is_empty());
    }
}
