mod adapter;
pub mod db;
mod memory;
pub mod models;
mod tables;

pub use adapter::{StorageAdapter, StorageError};
pub use db::RedbStorage;
pub use memory::MemoryStorage;
pub use tables::*;
