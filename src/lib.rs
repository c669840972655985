//! auth-sync - Keep one "is the user signed in" state consistent across contexts
//!
//! Contexts share nothing but a key-value store. This crate provides:
//! - A versioned, timestamped JSON envelope around the auth state
//! - Soft expiry of stored state after a configurable max age
//! - A per-context manager with a local cache and change listeners
//! - Polling-based convergence with every other context on the same store
//! - In-memory and redb-backed storage adapters
//!
//! Nothing here returns an error to the caller. Storage failures, corrupt
//! entries and misbehaving listeners are logged and read as "signed out".

pub mod clock;
pub mod codec;
pub mod config;
pub mod storage;
pub mod sync;
#[cfg(test)]
pub mod testutil;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::SyncOptions;
pub use storage::models::{AuthState, AuthStatus, StateSource, StoredEnvelope};
pub use storage::{MemoryStorage, RedbStorage, StorageAdapter, StorageError};
pub use sync::{AuthSync, Lifecycle, ManagerRegistry, Subscription};
