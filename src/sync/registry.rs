//! Per-context handout of a single [`AuthSync`] instance.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::manager::{AuthSync, Lifecycle};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncOptions;
use crate::storage::StorageAdapter;

/// Owns the one manager a context should use.
///
/// The first `get_instance` call decides the options; later calls get the
/// same instance back until it is destroyed.
pub struct ManagerRegistry {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    instance: Mutex<Option<Arc<AuthSync>>>,
}

impl ManagerRegistry {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            instance: Mutex::new(None),
        }
    }

    /// Return the active manager, constructing one if there is none.
    ///
    /// `options` only take effect when a new instance is built. Invalid
    /// options fall back to the defaults.
    pub fn get_instance(&self, options: Option<SyncOptions>) -> Arc<AuthSync> {
        let mut instance = self.instance.lock();

        if let Some(existing) = instance.as_ref() {
            if existing.lifecycle() == Lifecycle::Active {
                if let Some(requested) = options.as_ref() {
                    if requested != existing.options() {
                        debug!(
                            "auth_sync: options ignored, manager already running; destroy it first to reconfigure"
                        );
                    }
                }
                return Arc::clone(existing);
            }
        }

        let options = match options {
            Some(options) => match options.validate() {
                Ok(()) => options,
                Err(e) => {
                    warn!(error = %e, "auth_sync: invalid options, using defaults");
                    SyncOptions::default()
                }
            },
            None => SyncOptions::default(),
        };

        let manager = AuthSync::new(Arc::clone(&self.storage), Arc::clone(&self.clock), options);
        *instance = Some(Arc::clone(&manager));
        manager
    }

    /// The held instance, if any, without constructing one
    pub fn current(&self) -> Option<Arc<AuthSync>> {
        self.instance.lock().clone()
    }

    /// Destroy and forget the held instance.
    pub fn reset(&self) {
        if let Some(manager) = self.instance.lock().take() {
            manager.destroy();
        }
    }
}
