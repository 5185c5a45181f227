//! Cursor Properties
//!
//! A merged cursor view must equal a `BTreeMap` model of the committed data
//! with the transaction's pending operations applied on top, in either
//! direction and under any prefix filter.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::common::*;

#[derive(Debug, Clone)]
enum Op {
    Put(String, String),
    Delete(String),
    PrefixDelete(String),
}

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-d]{1,3}"
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (key_strategy(), "[a-z]{0,4}").prop_map(|(k, v)| Op::Put(k, v)),
        2 => key_strategy().prop_map(Op::Delete),
        1 => "[a-d]{1,2}".prop_map(Op::PrefixDelete),
    ]
}

fn apply_model(model: &mut Model, op: &Op) {
    match op {
        Op::Put(k, v) => {
            model.insert(k.as_bytes().to_vec(), v.as_bytes().to_vec());
        }
        Op::Delete(k) => {
            model.remove(k.as_bytes());
        }
        Op::PrefixDelete(p) => model.retain(|k, _| !k.starts_with(p.as_bytes())),
    }
}

fn apply_kvs(kvs: &Kvs, txn: &KvdbTransaction, op: &Op) {
    match op {
        Op::Put(k, v) => kvs.put(Some(txn), k.as_bytes(), v.as_bytes()).unwrap(),
        Op::Delete(k) => kvs.delete(Some(txn), k.as_bytes()).unwrap(),
        Op::PrefixDelete(p) => kvs.prefix_delete(Some(txn), p.as_bytes()).unwrap(),
    }
}

/// Expected cursor output from the model
fn expected(model: &Model, filter: Option<&str>, reverse: bool) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out: Vec<_> = model
        .iter()
        .filter(|(k, _)| filter.map_or(true, |p| k.starts_with(p.as_bytes())))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if reverse {
        out.reverse();
    }
    out
}

/// Commit `committed` in batches, then start a transaction holding `pending`
fn build(
    committed: &[Vec<Op>],
    pending: &[Op],
) -> (std::sync::Arc<Kvdb>, Kvs, KvdbTransaction, Model) {
    let (db, kvs) = test_kvs("props", KvsParams::transactional());
    let mut model = Model::new();

    for batch in committed {
        db.with_transaction(|txn| {
            for op in batch {
                apply_kvs(&kvs, txn, op);
                apply_model(&mut model, op);
            }
            Ok(())
        })
        .unwrap();
    }

    let txn = db.transaction();
    txn.begin().unwrap();
    for op in pending {
        apply_kvs(&kvs, &txn, op);
        apply_model(&mut model, op);
    }
    (db, kvs, txn, model)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merged_view_matches_model(
        committed in prop::collection::vec(prop::collection::vec(op_strategy(), 1..6), 0..4),
        pending in prop::collection::vec(op_strategy(), 0..12),
        reverse in any::<bool>(),
        bind in any::<bool>(),
        filter in prop::option::of("[a-d]{1,2}"),
    ) {
        let (_db, kvs, txn, model) = build(&committed, &pending);

        let mut options = CursorOptions::new().txn(&txn).bind(bind);
        if reverse {
            options = options.reverse();
        }
        if let Some(prefix) = &filter {
            options = options.filter(prefix.as_str());
        }
        let mut cursor = kvs.cursor(options).unwrap();

        prop_assert_eq!(drain(&mut cursor), expected(&model, filter.as_deref(), reverse));
        prop_assert!(cursor.eof());
        prop_assert_eq!(cursor.read().unwrap(), None);
    }

    #[test]
    fn seek_matches_model_range(
        committed in prop::collection::vec(prop::collection::vec(op_strategy(), 1..6), 1..4),
        pending in prop::collection::vec(op_strategy(), 0..8),
        target in "[a-e]{0,3}",
        reverse in any::<bool>(),
    ) {
        let (_db, kvs, txn, model) = build(&committed, &pending);

        let mut options = CursorOptions::new().txn(&txn).bind(true);
        if reverse {
            options = options.reverse();
        }
        let mut cursor = kvs.cursor(options).unwrap();

        let want: Vec<_> = expected(&model, None, reverse)
            .into_iter()
            .filter(|(k, _)| {
                if reverse {
                    k.as_slice() <= target.as_bytes()
                } else {
                    k.as_slice() >= target.as_bytes()
                }
            })
            .collect();

        let peeked = cursor.seek(target.as_bytes()).unwrap();
        prop_assert_eq!(peeked.map(|k| k.into_bytes()), want.first().map(|(k, _)| k.clone()));
        prop_assert_eq!(drain(&mut cursor), want);
    }

    #[test]
    fn snapshot_cursor_ignores_pending_and_later_commits(
        committed in prop::collection::vec(prop::collection::vec(op_strategy(), 1..6), 1..4),
        later in prop::collection::vec(op_strategy(), 1..6),
    ) {
        let (db, kvs) = test_kvs("props", KvsParams::transactional());
        let mut model = Model::new();
        for batch in &committed {
            db.with_transaction(|txn| {
                for op in batch {
                    apply_kvs(&kvs, txn, op);
                    apply_model(&mut model, op);
                }
                Ok(())
            })
            .unwrap();
        }

        let mut cursor = kvs.cursor(CursorOptions::new()).unwrap();
        db.with_transaction(|txn| {
            for op in &later {
                apply_kvs(&kvs, txn, op);
            }
            Ok(())
        })
        .unwrap();

        prop_assert_eq!(drain(&mut cursor), expected(&model, None, false));
    }
}
