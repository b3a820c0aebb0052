#[cfg(test)]
#[path = "tests/tx.rs"]
mod tests;

use std::collections::{btree_map, BTreeMap};

use crate::db::Column;

/// A batch of writes applied atomically by [`Database::apply`](crate::db::Database::apply).
///
/// Later operations on the same key replace earlier ones.
#[derive(Debug, Default, Clone)]
pub struct Transaction {
    cols: BTreeMap<Column, BTreeMap<Vec<u8>, Operation>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Put { value: Vec<u8> },
    Delete,
}

impl Transaction {
    #[must_use]
    pub fn get(&self, col: Column, key: &[u8]) -> Option<&Operation> {
        self.cols.get(&col).and_then(|ops| ops.get(key))
    }

    pub fn put(&mut self, col: Column, key: Vec<u8>, value: Vec<u8>) {
        let _ignored = self
            .cols
            .entry(col)
            .or_default()
            .insert(key, Operation::Put { value });
    }

    pub fn delete(&mut self, col: Column, key: Vec<u8>) {
        let _ignored = self
            .cols
            .entry(col)
            .or_default()
            .insert(key, Operation::Delete);
    }

    /// Folds `other` into this transaction; its operations win on conflict.
    pub fn merge(&mut self, other: Self) {
        for (col, ops) in other.cols {
            self.cols.entry(col).or_default().extend(ops);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cols.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cols.values().all(BTreeMap::is_empty)
    }

    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            iter: self.cols.iter(),
            cursor: None,
        }
    }
}

#[derive(Eq, Ord, Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Entry<'a> {
    column: Column,
    key: &'a [u8],
}

impl<'a> Entry<'a> {
    #[must_use]
    pub const fn key(&self) -> &'a [u8] {
        self.key
    }

    #[must_use]
    pub const fn column(&self) -> Column {
        self.column
    }
}

#[derive(Debug)]
pub struct Iter<'a> {
    iter: btree_map::Iter<'a, Column, BTreeMap<Vec<u8>, Operation>>,
    cursor: Option<IterCursor<'a>>,
}

#[derive(Debug)]
struct IterCursor<'a> {
    column: Column,
    iter: btree_map::Iter<'a, Vec<u8>, Operation>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Entry<'a>, &'a Operation);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                if let Some((key, op)) = cursor.iter.next() {
                    return Some((
                        Entry {
                            column: cursor.column,
                            key,
                        },
                        op,
                    ));
                }
            }

            let (column, col_iter) = self.iter.next()?;

            self.cursor = Some(IterCursor {
                column: *column,
                iter: col_iter.iter(),
            });
        }
    }
}
