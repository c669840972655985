use redb::{Database as RedbDatabase, ReadTransaction, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::adapter::{StorageAdapter, StorageError};
use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

impl From<DatabaseError> for StorageError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Io(e) => StorageError::Unavailable(e.to_string()),
            DatabaseError::RedbDatabase(e) => StorageError::Unavailable(e.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Persistent storage backed by a redb file.
///
/// Cheap to clone; clones share the underlying database, so every
/// manager opened on the same handle sees the same entries.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<RedbDatabase>,
}

impl RedbStorage {
    /// Open or create the store in the given directory
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("auth-sync.redb");
        let db = RedbDatabase::create(db_path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KV)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Read a raw entry
    pub fn get_entry(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(KV)?;

        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Insert or overwrite a raw entry
    pub fn put_entry(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(KV)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a raw entry, returning whether it existed
    pub fn delete_entry(&self, key: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(KV)?;
            let removed = table.remove(key)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}

impl StorageAdapter for RedbStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_entry(key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Ok(self.put_entry(key, value)?)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.delete_entry(key)?;
        Ok(())
    }

    fn is_blocking(&self) -> bool {
        true
    }
}
