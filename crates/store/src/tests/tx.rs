use super::*;
use crate::db::{Database, InMemoryDB};
use crate::Store;

#[test]
fn test_last_operation_wins() {
    let mut tx = Transaction::default();

    tx.put(Column::Keys, b"a".to_vec(), b"1".to_vec());
    tx.delete(Column::Keys, b"a".to_vec());

    assert_eq!(tx.len(), 1);
    assert_eq!(tx.get(Column::Keys, b"a"), Some(&Operation::Delete));
}

#[test]
fn test_iter_orders_by_column_then_key() {
    let mut tx = Transaction::default();

    tx.put(Column::Blacklist, b"b".to_vec(), vec![]);
    tx.put(Column::Meta, b"z".to_vec(), vec![]);
    tx.put(Column::Blacklist, b"a".to_vec(), vec![]);

    let entries = tx
        .iter()
        .map(|(entry, _)| (entry.column(), entry.key().to_vec()))
        .collect::<Vec<_>>();

    assert_eq!(
        entries,
        vec![
            (Column::Meta, b"z".to_vec()),
            (Column::Blacklist, b"a".to_vec()),
            (Column::Blacklist, b"b".to_vec()),
        ]
    );
}

#[test]
fn test_merge() {
    let mut first = Transaction::default();
    first.put(Column::Keys, b"a".to_vec(), b"1".to_vec());
    first.put(Column::Keys, b"b".to_vec(), b"1".to_vec());

    let mut second = Transaction::default();
    second.delete(Column::Keys, b"a".to_vec());

    first.merge(second);

    assert_eq!(first.len(), 2);
    assert_eq!(first.get(Column::Keys, b"a"), Some(&Operation::Delete));
}

#[test]
fn test_apply_in_memory() {
    let db = InMemoryDB::default();
    db.put(Column::PrefixTree, b"stale", b"x").unwrap();

    let mut tx = Transaction::default();
    tx.delete(Column::PrefixTree, b"stale".to_vec());
    tx.put(Column::PrefixTree, b"fresh".to_vec(), b"y".to_vec());
    tx.put(Column::Meta, b"params".to_vec(), b"p".to_vec());

    db.apply(&tx).unwrap();

    assert!(!db.has(Column::PrefixTree, b"stale").unwrap());
    assert_eq!(
        db.get(Column::PrefixTree, b"fresh").unwrap(),
        Some(b"y".to_vec())
    );
    assert_eq!(
        db.iter(Column::Meta).unwrap().keys().unwrap(),
        vec![b"params".to_vec()]
    );
}

#[test]
fn test_store_skips_empty_transaction() {
    let store = Store::in_memory();

    store.apply(&Transaction::default()).unwrap();

    assert_eq!(store.iter(Column::Keys).unwrap().count(), 0);
}
