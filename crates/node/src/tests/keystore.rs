use super::*;

fn fingerprint(byte: u8) -> Fingerprint {
    hex::encode([byte; 20]).parse().unwrap()
}

fn record(byte: u8) -> KeyRecord {
    KeyRecord::new(fingerprint(byte), vec![byte; 8])
}

fn key_store() -> EmbeddedKeyStore {
    EmbeddedKeyStore::new(Store::in_memory())
}

#[test]
fn test_insert_and_fetch() {
    let keys = key_store();

    assert!(keys.insert_key(record(1)).unwrap());
    assert!(!keys.insert_key(record(1)).unwrap());

    let id = record(1).id();
    assert_eq!(keys.fetch_key_material(&id).unwrap(), Some(record(1)));
    assert_eq!(keys.fetch_key_material(&record(2).id()).unwrap(), None);

    assert_eq!(keys.enumerate_active_key_identifiers().unwrap(), vec![id]);
}

#[test]
fn test_blacklist_and_delete() {
    let keys = key_store();

    for byte in 1..=3 {
        assert!(keys.insert_key(record(byte)).unwrap());
    }

    // 9 is not stored but still gets blacklisted
    let deleted = keys
        .blacklist_and_delete(&[fingerprint(2), fingerprint(9), fingerprint(2)], "ticket-1")
        .unwrap();

    assert_eq!(deleted, vec![record(2).id()]);
    assert_eq!(keys.fetch_key_material(&record(2).id()).unwrap(), None);

    assert!(keys.is_blacklisted(&fingerprint(2)).unwrap());
    assert!(keys.is_blacklisted(&fingerprint(9)).unwrap());
    assert!(!keys.is_blacklisted(&fingerprint(1)).unwrap());

    let listed = keys.list_blacklisted().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|entry| entry.comment == "ticket-1"));
}

#[test]
fn test_blocked_keys_are_kept_but_inactive() {
    let keys = key_store();

    assert!(keys.insert_key(record(1)).unwrap());
    assert!(keys.insert_key(record(2)).unwrap());

    let blocked = keys.blacklist(&[fingerprint(1)], "spam").unwrap();
    assert_eq!(blocked, vec![record(1).id()]);

    assert_eq!(keys.fetch_key_material(&record(1).id()).unwrap(), Some(record(1)));
    assert_eq!(
        keys.enumerate_active_key_identifiers().unwrap(),
        vec![record(2).id()]
    );
}

#[test]
fn test_blacklisting_twice_keeps_the_first_comment() {
    let keys = key_store();

    let _blocked = keys.blacklist(&[fingerprint(4)], "first").unwrap();
    let _blocked = keys.blacklist(&[fingerprint(4)], "second").unwrap();

    assert_eq!(
        keys.list_blacklisted().unwrap(),
        vec![BlacklistEntry {
            fingerprint: fingerprint(4),
            comment: "first".to_owned(),
        }]
    );
}

#[test]
fn test_upper_case_fingerprints_match() {
    let keys = key_store();

    let upper = hex::encode_upper([5; 20]).parse::<Fingerprint>().unwrap();

    let _blocked = keys.blacklist(&[upper], "case").unwrap();

    assert!(keys.is_blacklisted(&fingerprint(5)).unwrap());
}
