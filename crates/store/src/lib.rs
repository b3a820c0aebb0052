//! Column-oriented key/value storage shared by the prefix tree and the key store.
//!
//! Backends implement [`db::Database`]; [`Store`] is the cheaply clonable handle
//! the rest of the workspace passes around.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod iter;
pub mod tx;

use config::StoreConfig;
use db::{Column, Database};
use iter::Iter;
use tx::Transaction;

#[derive(Clone)]
pub struct Store {
    db: Arc<dyn Database>,
}

impl Store {
    pub fn open<T: Database>(config: &StoreConfig) -> eyre::Result<Self> {
        let db = T::open(config)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Wraps an already opened backend.
    pub fn new<T: Database>(db: T) -> Self {
        Self { db: Arc::new(db) }
    }

    /// A fresh in-memory store, used by tests and throwaway runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(db::InMemoryDB::default())
    }

    pub fn has(&self, col: Column, key: &[u8]) -> eyre::Result<bool> {
        self.db.has(col, key)
    }

    pub fn get(&self, col: Column, key: &[u8]) -> eyre::Result<Option<Vec<u8>>> {
        self.db.get(col, key)
    }

    pub fn put(&self, col: Column, key: &[u8], value: &[u8]) -> eyre::Result<()> {
        self.db.put(col, key, value)
    }

    pub fn delete(&self, col: Column, key: &[u8]) -> eyre::Result<()> {
        self.db.delete(col, key)
    }

    pub fn iter(&self, col: Column) -> eyre::Result<Iter<'_>> {
        self.db.iter(col)
    }

    /// Applies every operation of `tx` atomically.
    pub fn apply(&self, tx: &Transaction) -> eyre::Result<()> {
        if tx.is_empty() {
            return Ok(());
        }

        self.db.apply(tx)
    }
}

impl core::fmt::Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
