//! Bound Cursor Across Commit and Re-begin
//!
//! A cursor bound to a transaction keeps its position while the transaction
//! commits, begins again and is re-bound, and a separate transaction never
//! sees the new generation's pending writes.

use crate::common::*;

#[test]
fn bound_cursor_survives_commit_and_rebind() {
    let (db, kvs) = test_kvs("bind_committed", KvsParams::transactional());

    let txn = db.transaction();
    txn.begin().unwrap();

    let mut txcursor = kvs
        .cursor(CursorOptions::new().txn(&txn).bind(true))
        .unwrap();
    kvs.put(Some(&txn), b"a", b"1").unwrap();
    kvs.put(Some(&txn), b"b", b"2").unwrap();
    kvs.put(Some(&txn), b"c", b"3").unwrap();
    assert_eq!(txcursor.read().unwrap(), kv("a", "1"));

    txn.commit().unwrap();
    txn.begin().unwrap();
    txcursor.update(Some(&txn), true).unwrap();
    kvs.put(Some(&txn), b"a", b"12").unwrap();
    kvs.put(Some(&txn), b"b", b"22").unwrap();
    kvs.put(Some(&txn), b"c", b"32").unwrap();

    // Position is kept: iteration resumes after "a"
    assert_eq!(txcursor.read().unwrap(), kv("b", "22"));
    assert_eq!(txcursor.read().unwrap(), kv("c", "32"));

    {
        let t = db.transaction();
        t.begin().unwrap();
        let mut cursor = kvs.cursor(CursorOptions::new().txn(&t).bind(true)).unwrap();
        assert_eq!(cursor.read().unwrap(), kv("a", "1"));
        assert_eq!(cursor.read().unwrap(), kv("b", "2"));
        assert_eq!(cursor.read().unwrap(), kv("c", "3"));
        assert_eq!(cursor.read().unwrap(), None);
        assert!(cursor.eof());
        cursor.destroy().unwrap();
        t.commit().unwrap();
    }

    assert_eq!(txcursor.seek(b"0").unwrap(), Some(Key::from("a")));
    assert_eq!(txcursor.read().unwrap(), kv("a", "12"));
    assert_eq!(txcursor.read().unwrap(), kv("b", "22"));
    assert_eq!(txcursor.read().unwrap(), kv("c", "32"));
    assert_eq!(txcursor.read().unwrap(), None);
    assert!(txcursor.eof());

    txcursor.destroy().unwrap();
}

#[test]
fn committed_overlay_stays_visible_until_rebegin() {
    let (db, kvs) = test_kvs("bind_committed", KvsParams::transactional());
    let txn = db.transaction();
    txn.begin().unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();

    kvs.put(Some(&txn), b"a", b"1").unwrap();
    kvs.put(Some(&txn), b"b", b"2").unwrap();
    txn.commit().unwrap();

    // The snapshot predates the commit; the committed write set supplies the data
    assert!(txn.snapshot_seqno().unwrap() < txn.commit_seqno().unwrap());
    assert_eq!(drain_keys(&mut cursor), vec!["a", "b"]);
}

#[test]
fn bound_cursor_follows_rebegin_without_update() {
    let (db, kvs) = test_kvs("bind_committed", KvsParams::transactional());
    let txn = db.transaction();
    txn.begin().unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    kvs.put(Some(&txn), b"a", b"1").unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "1"));
    txn.commit().unwrap();

    txn.begin().unwrap();
    kvs.put(Some(&txn), b"b", b"2").unwrap();
    assert_eq!(txn.generation(), 2);
    assert_eq!(cursor.read().unwrap(), kv("b", "2"));
}

#[test]
fn aborted_generation_reads_base_only() {
    let (db, kvs) = test_kvs("bind_committed", KvsParams::transactional());
    commit_pairs(&db, &kvs, &[("a", "1"), ("c", "3")]);

    let txn = db.transaction();
    txn.begin().unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    kvs.put(Some(&txn), b"b", b"pending").unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "1"));
    assert_eq!(cursor.read().unwrap(), kv("b", "pending"));

    txn.abort().unwrap();
    assert_eq!(cursor.read().unwrap(), kv("c", "3"));
    cursor.seek(b"a").unwrap();
    assert_eq!(drain_keys(&mut cursor), vec!["a", "c"]);
}

#[test]
fn dropping_transaction_aborts_under_bound_cursor() {
    let (db, kvs) = test_kvs("bind_committed", KvsParams::transactional());
    commit_pairs(&db, &kvs, &[("a", "1")]);

    let mut cursor = {
        let txn = db.transaction();
        txn.begin().unwrap();
        kvs.put(Some(&txn), b"b", b"pending").unwrap();
        let cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
        cursor
    };

    assert_eq!(drain_keys(&mut cursor), vec!["a"]);
    assert_eq!(db.metrics().total_aborted, 1);
}
