use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Quota exceeded: value of {len} bytes exceeds quota of {quota} bytes")]
    QuotaExceeded { len: usize, quota: usize },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A synchronous, origin-scoped key-value store shared by every context.
///
/// Any call may fail. Callers in this crate never let those failures
/// escape; see `sync::manager` for the fallbacks.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Whether calls may block on disk or network I/O. Blocking adapters
    /// are polled on tokio's blocking pool instead of a runtime worker.
    fn is_blocking(&self) -> bool {
        false
    }
}
