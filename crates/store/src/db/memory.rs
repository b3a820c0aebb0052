use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::config::StoreConfig;
use crate::db::{Column, Database};
use crate::iter::{DBIter, Iter};
use crate::tx::{Operation, Transaction};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile backend. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct InMemoryDB {
    cols: RwLock<BTreeMap<Column, ColumnMap>>,
}

impl Database for InMemoryDB {
    fn open(_config: &StoreConfig) -> eyre::Result<Self> {
        Ok(Self::default())
    }

    fn has(&self, col: Column, key: &[u8]) -> eyre::Result<bool> {
        Ok(self
            .cols
            .read()
            .get(&col)
            .is_some_and(|column| column.contains_key(key)))
    }

    fn get(&self, col: Column, key: &[u8]) -> eyre::Result<Option<Vec<u8>>> {
        Ok(self
            .cols
            .read()
            .get(&col)
            .and_then(|column| column.get(key))
            .cloned())
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> eyre::Result<()> {
        let _ignored = self
            .cols
            .write()
            .entry(col)
            .or_default()
            .insert(key.to_vec(), value.to_vec());

        Ok(())
    }

    fn delete(&self, col: Column, key: &[u8]) -> eyre::Result<()> {
        if let Some(column) = self.cols.write().get_mut(&col) {
            let _ignored = column.remove(key);
        }

        Ok(())
    }

    fn iter(&self, col: Column) -> eyre::Result<Iter<'_>> {
        // Iterates a copy so writers are never blocked by a slow reader.
        let entries = self.cols.read().get(&col).cloned().unwrap_or_default();

        Ok(Iter::new(MemoryIter {
            entries: entries.into_iter(),
        }))
    }

    fn apply(&self, tx: &Transaction) -> eyre::Result<()> {
        let mut cols = self.cols.write();

        for (entry, op) in tx.iter() {
            let column = cols.entry(entry.column()).or_default();

            match op {
                Operation::Put { value } => {
                    let _ignored = column.insert(entry.key().to_vec(), value.clone());
                }
                Operation::Delete => {
                    let _ignored = column.remove(entry.key());
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
struct MemoryIter {
    entries: std::collections::btree_map::IntoIter<Vec<u8>, Vec<u8>>,
}

impl DBIter for MemoryIter {
    fn next(&mut self) -> eyre::Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.entries.next())
    }
}
