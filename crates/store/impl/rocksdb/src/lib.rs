//! RocksDB backend for [`keysync_store::db::Database`].
//!
//! Every [`Column`] maps to a column family of the same name. A `DB` handle is
//! thread-safe and manages its own file handles, so a single instance is shared
//! through [`keysync_store::Store`].


use eyre::{bail, Result as EyreResult};
use keysync_store::config::StoreConfig;
use keysync_store::db::{Column, Database};
use keysync_store::iter::{DBIter, Iter};
use keysync_store::tx::{Operation, Transaction};
use rocksdb::{ColumnFamily, DBRawIteratorWithThreadMode, Options, WriteBatch, DB};
use strum::IntoEnumIterator;

/// Upper bound on SST files kept open at once.
const DEFAULT_MAX_OPEN_FILES: i32 = 256;

/// Block cache size in bytes (64MB).
const DEFAULT_BLOCK_CACHE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct RocksDB {
    db: DB,
}

impl RocksDB {
    fn cf_handle(&self, column: Column) -> Option<&ColumnFamily> {
        self.db.cf_handle(column.as_ref())
    }

    fn try_cf_handle(&self, column: Column) -> EyreResult<&ColumnFamily> {
        let Some(cf_handle) = self.cf_handle(column) else {
            bail!("unknown column family: {:?}", column);
        };

        Ok(cf_handle)
    }
}

impl Database for RocksDB {
    fn open(config: &StoreConfig) -> EyreResult<Self> {
        let mut options = Options::default();

        options.create_if_missing(true);
        options.create_missing_column_families(true);
        options.set_max_open_files(DEFAULT_MAX_OPEN_FILES);

        let cache = rocksdb::Cache::new_lru_cache(DEFAULT_BLOCK_CACHE_SIZE);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_block_cache(&cache);
        options.set_block_based_table_factory(&block_opts);

        Ok(Self {
            db: DB::open_cf(&options, &config.path, Column::iter())?,
        })
    }

    fn has(&self, col: Column, key: &[u8]) -> EyreResult<bool> {
        let cf_handle = self.try_cf_handle(col)?;

        let exists = self.db.key_may_exist_cf(cf_handle, key)
            && self.db.get_pinned_cf(cf_handle, key)?.is_some();

        Ok(exists)
    }

    fn get(&self, col: Column, key: &[u8]) -> EyreResult<Option<Vec<u8>>> {
        let cf_handle = self.try_cf_handle(col)?;

        let value = self.db.get_pinned_cf(cf_handle, key)?;

        Ok(value.map(|value| value.to_vec()))
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> EyreResult<()> {
        let cf_handle = self.try_cf_handle(col)?;

        self.db.put_cf(cf_handle, key, value)?;

        Ok(())
    }

    fn delete(&self, col: Column, key: &[u8]) -> EyreResult<()> {
        let cf_handle = self.try_cf_handle(col)?;

        self.db.delete_cf(cf_handle, key)?;

        Ok(())
    }

    fn iter(&self, col: Column) -> EyreResult<Iter<'_>> {
        let cf_handle = self.try_cf_handle(col)?;

        let mut iter = self.db.raw_iterator_cf(cf_handle);

        iter.seek_to_first();

        Ok(Iter::new(DBIterator { ready: true, iter }))
    }

    fn apply(&self, tx: &Transaction) -> EyreResult<()> {
        let mut batch = WriteBatch::default();

        let mut unknown_cfs = vec![];

        for (entry, op) in tx.iter() {
            let (col, key) = (entry.column(), entry.key());

            let Some(cf) = self.cf_handle(col) else {
                unknown_cfs.push(col);
                continue;
            };

            match op {
                Operation::Put { value } => batch.put_cf(cf, key, value),
                Operation::Delete => batch.delete_cf(cf, key),
            }
        }

        if !unknown_cfs.is_empty() {
            bail!("unknown column families: {:?}", unknown_cfs);
        }

        self.db.write(batch)?;

        Ok(())
    }
}

struct DBIterator<'a> {
    ready: bool,
    iter: DBRawIteratorWithThreadMode<'a, DB>,
}

impl DBIter for DBIterator<'_> {
    fn next(&mut self) -> EyreResult<Option<(Vec<u8>, Vec<u8>)>> {
        if self.ready {
            self.ready = false;
        } else {
            self.iter.next();
        }

        let (Some(key), Some(value)) = (self.iter.key(), self.iter.value()) else {
            self.iter.status()?;
            return Ok(None);
        };

        Ok(Some((key.to_vec(), value.to_vec())))
    }
}
