//! Concurrent Commits
//!
//! Multi-threaded commit behavior: first-committer-wins on overlapping keys,
//! no lost updates under retry, and atomic visibility of batches to cursors.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use crate::common::*;

#[test]
fn second_committer_on_same_key_conflicts() {
    let (db, kvs) = test_kvs("fcw", KvsParams::transactional());

    let t1 = db.transaction();
    let t2 = db.transaction();
    t1.begin().unwrap();
    t2.begin().unwrap();
    kvs.put(Some(&t1), b"k", b"one").unwrap();
    kvs.put(Some(&t2), b"k", b"two").unwrap();

    t1.commit().unwrap();
    let err = t2.commit().unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(t2.state(), TransactionState::Aborted);
    assert!(t2.abort_reason().is_some());
    assert_eq!(kvs.get(None, b"k").unwrap(), Some(b"one".to_vec()));

    let metrics = db.metrics();
    assert_eq!(metrics.total_committed, 1);
    assert_eq!(metrics.total_aborted, 1);
    assert_eq!(metrics.active_count, 0);

    // The loser can begin again and retry on fresh data
    t2.begin().unwrap();
    assert_eq!(kvs.get(Some(&t2), b"k").unwrap(), Some(b"one".to_vec()));
    kvs.put(Some(&t2), b"k", b"two").unwrap();
    t2.commit().unwrap();
    assert_eq!(kvs.get(None, b"k").unwrap(), Some(b"two".to_vec()));
}

#[test]
fn prefix_delete_conflicts_with_concurrent_put_under_prefix() {
    let (db, kvs) = test_kvs("fcw", KvsParams::transactional());
    commit_pairs(&db, &kvs, &[("user:1", "a")]);

    let deleter = db.transaction();
    deleter.begin().unwrap();
    kvs.prefix_delete(Some(&deleter), b"user:").unwrap();

    db.with_transaction(|t| kvs.put(Some(t), b"user:2", b"b"))
        .unwrap();

    assert!(deleter.commit().unwrap_err().is_conflict());
    assert_eq!(kvs.get(None, b"user:1").unwrap(), Some(b"a".to_vec()));
    assert_eq!(kvs.get(None, b"user:2").unwrap(), Some(b"b".to_vec()));
}

#[test]
fn disjoint_writers_all_commit() {
    const THREADS: usize = 8;
    const TXNS_PER_THREAD: usize = 25;

    let (db, kvs) = test_kvs("disjoint", KvsParams::transactional());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let kvs = kvs.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..TXNS_PER_THREAD {
                    db.with_transaction(|txn| {
                        let key = format!("t{:02}:{:03}", t, i);
                        kvs.put(Some(txn), key.as_bytes(), b"v")
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
    assert_eq!(drain_keys(&mut cursor).len(), THREADS * TXNS_PER_THREAD);
    assert_eq!(
        db.metrics().total_committed,
        (THREADS * TXNS_PER_THREAD) as u64
    );
    assert_eq!(db.metrics().total_aborted, 0);
}

#[test]
fn exactly_one_racer_wins_hot_key() {
    const THREADS: usize = 8;

    let (db, kvs) = test_kvs("hot", KvsParams::transactional());
    // Every racer begins before anyone commits
    let barrier = Arc::new(Barrier::new(THREADS));
    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let kvs = kvs.clone();
            let barrier = Arc::clone(&barrier);
            let wins = Arc::clone(&wins);
            let conflicts = Arc::clone(&conflicts);
            thread::spawn(move || {
                let txn = db.transaction();
                txn.begin().unwrap();
                barrier.wait();

                kvs.put(Some(&txn), b"hot", format!("{}", t).as_bytes())
                    .unwrap();
                match txn.commit() {
                    Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                    Err(e) if e.is_conflict() => conflicts.fetch_add(1, Ordering::SeqCst),
                    Err(e) => panic!("unexpected commit error: {}", e),
                };
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(conflicts.load(Ordering::SeqCst), THREADS - 1);
    assert_eq!(db.metrics().total_aborted, (THREADS - 1) as u64);
}

#[test]
fn retried_increments_lose_no_updates() {
    const THREADS: usize = 4;
    const INCREMENTS: usize = 50;

    let (db, kvs) = test_kvs("counter", KvsParams::transactional());
    commit_pairs(&db, &kvs, &[("counter", "0")]);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            let kvs = kvs.clone();
            thread::spawn(move || {
                let txn = db.transaction();
                for _ in 0..INCREMENTS {
                    loop {
                        txn.begin().unwrap();
                        let current: u64 = String::from_utf8(
                            kvs.get(Some(&txn), b"counter").unwrap().unwrap(),
                        )
                        .unwrap()
                        .parse()
                        .unwrap();
                        kvs.put(Some(&txn), b"counter", (current + 1).to_string().as_bytes())
                            .unwrap();
                        match txn.commit() {
                            Ok(_) => break,
                            Err(e) => assert!(e.is_conflict(), "unexpected error: {}", e),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (THREADS * INCREMENTS).to_string();
    assert_eq!(
        kvs.get(None, b"counter").unwrap(),
        Some(expected.into_bytes())
    );
}

#[test]
fn cursors_never_observe_partial_batches() {
    const BATCH_KEYS: usize = 10;
    const ROUNDS: usize = 200;
    const READERS: usize = 4;

    let (db, kvs) = test_kvs("atomic", KvsParams::transactional());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let db = Arc::clone(&db);
        let kvs = kvs.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for round in 0..ROUNDS {
                db.with_transaction(|txn| {
                    let value = round.to_string();
                    for k in 0..BATCH_KEYS {
                        kvs.put(Some(txn), format!("k{:02}", k).as_bytes(), value.as_bytes())?;
                    }
                    Ok(())
                })
                .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..READERS)
        .map(|r| {
            let kvs = kvs.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checks = 0usize;
                while !done.load(Ordering::SeqCst) || checks == 0 {
                    let mut options = CursorOptions::new();
                    if r % 2 == 1 {
                        options = options.reverse();
                    }
                    let mut cursor = kvs.cursor(options).unwrap();
                    let entries = drain(&mut cursor);

                    assert!(
                        entries.is_empty() || entries.len() == BATCH_KEYS,
                        "saw {} of {} keys",
                        entries.len(),
                        BATCH_KEYS
                    );
                    if let Some((_, first)) = entries.first() {
                        assert!(
                            entries.iter().all(|(_, v)| v == first),
                            "mixed rounds in one snapshot"
                        );
                    }
                    checks += 1;
                }
                checks
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(db.snapshot_count(), 0);
}

#[test]
fn bound_cursor_reads_stable_snapshot_while_others_commit() {
    let (db, kvs) = test_kvs("stable", KvsParams::transactional());
    commit_pairs(&db, &kvs, &[("a", "0"), ("b", "0"), ("c", "0")]);

    let txn = db.transaction();
    txn.begin().unwrap();
    let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true)).unwrap();
    assert_eq!(cursor.read().unwrap(), kv("a", "0"));

    let writer = {
        let db = Arc::clone(&db);
        let kvs = kvs.clone();
        thread::spawn(move || {
            for round in 1..=20 {
                db.with_transaction(|t| {
                    kvs.put(Some(t), b"b", round.to_string().as_bytes())?;
                    kvs.put(Some(t), b"d", b"new")
                })
                .unwrap();
            }
        })
    };
    writer.join().unwrap();

    assert_eq!(cursor.read().unwrap(), kv("b", "0"));
    assert_eq!(cursor.read().unwrap(), kv("c", "0"));
    assert_eq!(cursor.read().unwrap(), None);
}
