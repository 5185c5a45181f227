//! Re-binding Cursors
//!
//! `update()` swaps the view under a cursor without moving it: static and
//! bound transaction views, back to the latest commit, EOF handling, seek
//! ranges, reverse order and prefix filters.

use crate::common::*;

fn seeded(keys: &[&str]) -> (std::sync::Arc<Kvdb>, Kvs) {
    let (db, kvs) = test_kvs("rebind", KvsParams::transactional());
    let pairs: Vec<(&str, &str)> = keys.iter().map(|k| (*k, "base")).collect();
    commit_pairs(&db, &kvs, &pairs);
    (db, kvs)
}

#[test]
fn update_to_transaction_keeps_position() {
    let (db, kvs) = seeded(&["a", "c", "e"]);
    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "base"));
    assert_eq!(cursor.read().unwrap(), kv("c", "base"));

    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"b", b"before").unwrap();
    kvs.put(Some(&txn), b"d", b"after").unwrap();
    kvs.delete(Some(&txn), b"e").unwrap();

    cursor.update(Some(&txn), true).unwrap();
    assert!(cursor.is_bound());
    // "b" sorts before the position and is never returned
    assert_eq!(drain_keys(&mut cursor), vec!["d"]);
}

#[test]
fn static_copy_ignores_later_transaction_writes() {
    let (db, kvs) = seeded(&["a"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"b", b"1").unwrap();

    let mut copy = kvs.cursor(CursorOptions::new()).unwrap();
    copy.update(Some(&txn), false).unwrap();
    let mut live = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();

    kvs.put(Some(&txn), b"c", b"2").unwrap();
    kvs.delete(Some(&txn), b"a").unwrap();

    assert!(!copy.is_bound());
    assert_eq!(drain_keys(&mut copy), vec!["a", "b"]);
    assert_eq!(drain_keys(&mut live), vec!["b", "c"]);
    assert_eq!(copy.snapshot_seqno(), txn.snapshot_seqno());
}

#[test]
fn static_copy_survives_commit() {
    let (db, kvs) = seeded(&["a"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"b", b"mine").unwrap();
    let mut copy = kvs.cursor(CursorOptions::new().txn(&txn)).unwrap();

    txn.commit().unwrap();
    txn.begin().unwrap();
    kvs.delete(Some(&txn), b"b").unwrap();

    assert_eq!(drain_keys(&mut copy), vec!["a", "b"]);
}

#[test]
fn unbind_to_latest_commit() {
    let (db, kvs) = seeded(&["a", "b"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"pending", b"x").unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "base"));

    db.with_transaction(|t| kvs.put(Some(t), b"c", b"other"))
        .unwrap();

    cursor.update(None, false).unwrap();
    assert!(!cursor.is_bound());
    assert_eq!(cursor.snapshot_seqno(), Some(db.latest_committed_seqno()));
    // The pending key is gone and the other commit is visible
    assert_eq!(drain_keys(&mut cursor), vec!["b", "c"]);
}

#[test]
fn eof_is_reported_until_next_read_after_update() {
    let (db, kvs) = seeded(&["a"]);
    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    assert_eq!(drain_keys(&mut cursor), vec!["a"]);
    assert!(cursor.eof());

    db.with_transaction(|t| kvs.put(Some(t), b"b", b"late"))
        .unwrap();
    cursor.update(None, false).unwrap();

    // The flag is left alone by update; the next read looks again
    assert!(cursor.eof());
    assert_eq!(cursor.read().unwrap(), kv("b", "late"));
    assert!(!cursor.eof());
    assert_eq!(cursor.read().unwrap(), None);
    assert!(cursor.eof());
}

#[test]
fn update_with_nothing_new_stays_at_eof() {
    let (_db, kvs) = seeded(&["a"]);
    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    assert_eq!(drain_keys(&mut cursor), vec!["a"]);

    cursor.update(None, false).unwrap();
    assert_eq!(cursor.read().unwrap(), None);
    assert!(cursor.eof());
}

#[test]
fn bound_cursor_eof_is_sticky_until_update() {
    let (db, kvs) = seeded(&["a"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    assert_eq!(drain_keys(&mut cursor), vec!["a"]);

    kvs.put(Some(&txn), b"b", b"new").unwrap();
    assert_eq!(cursor.read().unwrap(), None);

    cursor.update(Some(&txn), true).unwrap();
    assert_eq!(cursor.read().unwrap(), kv("b", "new"));
}

#[test]
fn seek_keeps_view() {
    let (db, kvs) = seeded(&["a", "b"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"c", b"mine").unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    assert_eq!(drain_keys(&mut cursor), vec!["a", "b", "c"]);

    assert_eq!(cursor.seek(b"b").unwrap(), Some(Key::from("b")));
    assert!(!cursor.eof());
    assert_eq!(drain_keys(&mut cursor), vec!["b", "c"]);
}

#[test]
fn seek_range_over_merged_view() {
    let (db, kvs) = seeded(&["a", "c", "e", "g"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"d", b"mine").unwrap();
    kvs.delete(Some(&txn), b"e").unwrap();
    kvs.put(Some(&txn), b"f", b"mine").unwrap();

    let mut forward = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    assert_eq!(forward.seek_range(b"b", b"f").unwrap(), Some(Key::from("c")));
    assert_eq!(drain_keys(&mut forward), vec!["c", "d", "f"]);

    let mut reverse = kvs
        .cursor(CursorOptions::new().txn(&txn).bind(true).reverse())
        .unwrap();
    assert_eq!(reverse.seek_range(b"b", b"f").unwrap(), Some(Key::from("f")));
    assert_eq!(drain_keys(&mut reverse), vec!["f", "d", "c"]);

    // Empty range
    assert_eq!(forward.seek_range(b"x", b"z").unwrap(), None);
    assert_eq!(forward.read().unwrap(), None);
}

#[test]
fn seek_range_limit_survives_update() {
    let (db, kvs) = seeded(&["a", "b", "c", "d"]);
    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    cursor.seek_range(b"a", b"b").unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "base"));

    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"bb", b"mine").unwrap();
    cursor.update(Some(&txn), false).unwrap();

    assert_eq!(drain_keys(&mut cursor), vec!["b"]);
}

#[test]
fn reverse_cursor_rebinds_in_place() {
    let (db, kvs) = seeded(&["a", "c", "e"]);
    let mut cursor = kvs.cursor(CursorOptions::new().reverse()).unwrap();
    assert_eq!(cursor.read().unwrap(), kv("e", "base"));

    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"d", b"mine").unwrap();
    kvs.put(Some(&txn), b"f", b"mine").unwrap();
    kvs.put(Some(&txn), b"b", b"mine").unwrap();

    cursor.update(Some(&txn), true).unwrap();
    // "f" lies behind a reverse cursor positioned after "e"
    assert_eq!(drain_keys(&mut cursor), vec!["d", "c", "b", "a"]);
}

#[test]
fn prefix_filter_applies_to_overlay() {
    let (db, kvs) = seeded(&["app", "apple", "banana"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    kvs.put(Some(&txn), b"apricot", b"mine").unwrap();
    kvs.put(Some(&txn), b"avocado", b"mine").unwrap();
    kvs.delete(Some(&txn), b"apple").unwrap();

    let mut cursor = kvs
        .cursor(CursorOptions::new().txn(&txn).bind(true).filter("ap"))
        .unwrap();
    assert_eq!(drain_keys(&mut cursor), vec!["app", "apricot"]);

    let mut reverse = kvs
        .cursor(CursorOptions::new().txn(&txn).filter("ap").reverse())
        .unwrap();
    assert_eq!(drain_keys(&mut reverse), vec!["apricot", "app"]);

    // Seeking outside the prefix lands on its edge
    assert_eq!(cursor.seek(b"a").unwrap(), Some(Key::from("app")));
    assert_eq!(cursor.seek(b"b").unwrap(), None);
}

#[test]
fn prefix_delete_hides_base_but_not_later_puts() {
    let (db, kvs) = seeded(&["log:1", "log:2", "meta"]);
    let txn = db.transaction();
    txn.begin().unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();

    kvs.prefix_delete(Some(&txn), b"log:").unwrap();
    kvs.put(Some(&txn), b"log:3", b"fresh").unwrap();

    assert_eq!(drain_keys(&mut cursor), vec!["log:3", "meta"]);
}

#[test]
fn update_rejects_unusable_transactions() {
    let (db, kvs) = seeded(&["a"]);
    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "base"));

    let fresh = db.transaction();
    assert!(cursor.update(Some(&fresh), true).unwrap_err().is_invalid_state());
    assert!(cursor.update(Some(&fresh), false).unwrap_err().is_invalid_state());

    let done = db.transaction();
    done.begin().unwrap();
    done.commit().unwrap();
    assert!(cursor.update(Some(&done), false).unwrap_err().is_invalid_state());
    cursor.update(Some(&done), true).unwrap();

    // Failed updates left the position alone
    assert_eq!(cursor.read().unwrap(), None);
}

#[test]
fn update_releases_previous_snapshot() {
    let (db, kvs) = seeded(&["a"]);
    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    let first = cursor.snapshot_seqno().unwrap();

    db.with_transaction(|t| kvs.put(Some(t), b"b", b"x"))
        .unwrap();
    cursor.update(None, false).unwrap();

    assert!(cursor.snapshot_seqno().unwrap() > first);
    assert_eq!(db.snapshot_count(), 1);
}

#[test]
fn transaction_from_other_database_rejected() {
    let (_db, kvs) = seeded(&["a"]);
    let other = test_db();
    let foreign = other.transaction();
    foreign.begin().unwrap();

    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    assert!(matches!(
        cursor.update(Some(&foreign), true),
        Err(KvdbError::InvalidInput { .. })
    ));
    assert!(matches!(
        kvs.cursor(CursorOptions::new().txn(&foreign)),
        Err(KvdbError::InvalidInput { .. })
    ));
}
