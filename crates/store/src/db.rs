use strum::{AsRefStr, EnumIter};

use crate::config::StoreConfig;
use crate::iter::Iter;
use crate::tx::Transaction;

mod memory;

pub use memory::InMemoryDB;

#[derive(Eq, Ord, Copy, Clone, Debug, PartialEq, PartialOrd, Hash, EnumIter, AsRefStr)]
pub enum Column {
    /// Tree parameters and other bookkeeping.
    Meta,
    /// Persisted prefix-tree nodes, keyed by encoded prefix.
    PrefixTree,
    /// Key material, keyed by key identifier.
    Keys,
    /// Blacklisted fingerprints.
    Blacklist,
}

pub trait Database: Send + Sync + 'static {
    fn open(config: &StoreConfig) -> eyre::Result<Self>
    where
        Self: Sized;

    fn has(&self, col: Column, key: &[u8]) -> eyre::Result<bool>;
    fn get(&self, col: Column, key: &[u8]) -> eyre::Result<Option<Vec<u8>>>;
    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> eyre::Result<()>;
    fn delete(&self, col: Column, key: &[u8]) -> eyre::Result<()>;
    fn iter(&self, col: Column) -> eyre::Result<Iter<'_>>;

    fn apply(&self, tx: &Transaction) -> eyre::Result<()>;
}
