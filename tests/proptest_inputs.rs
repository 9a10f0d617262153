//! Property-based tests over arbitrary inputs.
//!
//! The first group only checks that arbitrary inputs never panic. Errors are
//! acceptable (e.g., `BadValSize` when writing an empty or oversized key),
//! panics are not. The second group checks results against an in-memory model.
#![allow(missing_docs)]

use proptest::prelude::*;
use signet_lmdb::{Database, DatabaseFlags, Environment, LmdbError, OverwritePolicy, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use tempfile::tempdir;

/// Strategy for generating byte vectors of various sizes (0 to 1KB).
fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for keys the engine always accepts: non-empty and within the
/// default 511 byte key limit.
fn arb_safe_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=511)
}

/// Short keys over a small alphabet, so prefixes and collisions are common.
fn arb_dense_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'c', 1..6)
}

/// Like [`arb_dense_key`], but may be empty.
fn arb_prefix() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'c', 0..6)
}

/// Strategy for valid database names (alphanumeric + underscore, 1-64 chars).
fn arb_db_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,63}"
}

#[derive(Debug, Clone)]
enum Op {
    Put(Vec<u8>, Vec<u8>),
    Insert(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_dense_key(), arb_bytes()).prop_map(|(k, v)| Op::Put(k, v)),
        (arb_dense_key(), arb_bytes()).prop_map(|(k, v)| Op::Insert(k, v)),
        arb_dense_key().prop_map(Op::Delete),
    ]
}

/// Applies `op` to both the database and the model, checking that both
/// agree on the outcome.
fn apply(
    db: Database,
    txn: &mut Transaction<'_>,
    model: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    op: &Op,
) -> Result<(), TestCaseError> {
    match op {
        Op::Put(k, v) => {
            db.write(txn, k, v, OverwritePolicy::AllowOverwrite).unwrap();
            model.insert(k.clone(), v.clone());
        }
        Op::Insert(k, v) => {
            let result = db.write(txn, k, v, OverwritePolicy::NoOverwrite);
            if model.contains_key(k) {
                prop_assert_eq!(result, Err(LmdbError::KeyExists));
            } else {
                prop_assert_eq!(result, Ok(()));
                model.insert(k.clone(), v.clone());
            }
        }
        Op::Delete(k) => {
            let result = db.delete(txn, k);
            if model.remove(k).is_some() {
                prop_assert_eq!(result, Ok(()));
            } else {
                prop_assert_eq!(result, Err(LmdbError::KeyNotFound));
            }
        }
    }
    Ok(())
}

/// Every entry, in cursor order.
fn contents(db: Database, txn: &Transaction<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut cursor = db.new_cursor(txn).unwrap();
    cursor.iter_start().map(Result::unwrap).collect()
}

// =============================================================================
// Arbitrary inputs do not panic
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Test that write/get with arbitrary key/value does not panic.
    #[test]
    fn put_get_arbitrary_kv(key in arb_bytes(), value in arb_bytes()) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();

        // Should not panic - may return error for invalid sizes
        let put_result = db.write(&mut txn, &key, &value, OverwritePolicy::AllowOverwrite);

        // If write succeeded, get should return the value
        if put_result.is_ok() {
            let got = db.get(&txn, &key).unwrap();
            prop_assert_eq!(got.map(|v| v.to_vec()), Some(value));
        } else {
            prop_assert_eq!(put_result, Err(LmdbError::BadValSize));
        }
    }

    /// Test that delete with nonexistent arbitrary key does not panic.
    #[test]
    fn del_nonexistent_key(key in arb_bytes()) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();

        prop_assert!(db.delete(&mut txn, &key).is_err());
    }

    /// Test that get with arbitrary key on empty db does not panic.
    #[test]
    fn get_arbitrary_key_empty_db(key in arb_bytes()) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();

        let result = db.get(&txn, &key);
        prop_assert!(!matches!(result, Ok(Some(_))));
    }

    /// Test that cursor positioning with an arbitrary key does not panic.
    #[test]
    fn cursor_seek_arbitrary_key(key in arb_bytes()) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init_with_flags(&txn, None, DatabaseFlags::DUP_SORT, true).unwrap();
        db.write(&mut txn, b"middle", b"v", OverwritePolicy::AllowOverwrite).unwrap();

        let mut cursor = db.new_cursor(&txn).unwrap();
        let _ = cursor.seek_to(&key);
        let _ = cursor.get(&key);
        let _ = cursor.has_key(&key);
        let _ = cursor.next_dup();
        let _ = cursor.iter_prefix(&key).count();
        let _ = cursor.iter_dup_of(&key).count();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Test that databases with arbitrary valid names can be created and
    /// resolved again.
    #[test]
    fn create_db_arbitrary_name(name in arb_db_name()) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().set_max_dbs(1).open(dir.path()).unwrap();

        let txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, Some(&name), true).unwrap();
        txn.commit().unwrap();

        prop_assert_eq!(db.name(&env).unwrap(), Some(name.clone()));
        let txn = env.begin_ro_txn().unwrap();
        prop_assert_eq!(Database::init(&txn, Some(&name), false), Ok(db));
    }
}

// =============================================================================
// Correctness against a model
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Test that any sequence of writes and deletes leaves the database equal
    /// to the model, iterated in sorted order.
    #[test]
    fn ops_match_model(ops in prop::collection::vec(arb_op(), 1..64)) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();

        let mut model = BTreeMap::new();
        for op in &ops {
            apply(db, &mut txn, &mut model, op)?;
        }
        txn.commit().unwrap();

        let txn = env.begin_ro_txn().unwrap();
        let expected: Vec<_> = model.clone().into_iter().collect();
        prop_assert_eq!(contents(db, &txn), expected);
        for (k, v) in &model {
            prop_assert_eq!(db.get(&txn, k).unwrap().map(|s| s.to_vec()), Some(v.clone()));
        }
    }

    /// Test that an aborted transaction leaves every key as it was.
    #[test]
    fn abort_leaves_state_unchanged(
        setup in prop::collection::vec(arb_op(), 0..32),
        discarded in prop::collection::vec(arb_op(), 1..32),
    ) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();

        let mut model = BTreeMap::new();
        for op in &setup {
            apply(db, &mut txn, &mut model, op)?;
        }
        txn.commit().unwrap();

        let before = contents(db, &env.begin_ro_txn().unwrap());

        let mut txn = env.begin_rw_txn().unwrap();
        let mut scratch = model.clone();
        for op in &discarded {
            apply(db, &mut txn, &mut scratch, op)?;
        }
        txn.abort();

        prop_assert_eq!(contents(db, &env.begin_ro_txn().unwrap()), before);
    }

    /// Test that seek_to positions at the first key >= the search key.
    #[test]
    fn seek_to_correctness(
        entries in prop::collection::vec((arb_safe_key(), arb_bytes()), 1..20),
        search_key in arb_safe_key(),
    ) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();

        let mut model = BTreeMap::new();
        for (key, value) in entries {
            db.write(&mut txn, &key, &value, OverwritePolicy::AllowOverwrite).unwrap();
            model.insert(key, value);
        }

        let expected = model.range(search_key.clone()..).next();
        let mut cursor = db.new_cursor(&txn).unwrap();
        let found = cursor.seek_to(&search_key).unwrap();
        prop_assert_eq!(found, expected.is_some());
        prop_assert_eq!(cursor.valid(), found);
        if let Some((k, v)) = expected {
            prop_assert_eq!(cursor.key().unwrap(), k.as_slice());
            prop_assert_eq!(cursor.value().unwrap(), v.as_slice());
        }
    }

    /// Test that a prefix scan yields exactly the keys with that prefix, in
    /// ascending order.
    #[test]
    fn prefix_scan_correctness(
        keys in prop::collection::btree_set(arb_dense_key(), 0..40),
        prefix in arb_prefix(),
    ) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();
        for key in &keys {
            db.write(&mut txn, key, b"", OverwritePolicy::NoOverwrite).unwrap();
        }

        let expected: Vec<Vec<u8>> =
            keys.iter().filter(|k| k.starts_with(&prefix)).cloned().collect();

        let mut cursor = db.new_cursor(&txn).unwrap();
        let mut scanned = Vec::new();
        let mut found = cursor.seek_to(&prefix).unwrap();
        while found && cursor.key().unwrap().starts_with(&prefix) {
            scanned.push(cursor.key().unwrap().to_vec());
            found = cursor.next().unwrap();
        }
        prop_assert_eq!(&scanned, &expected);

        let iterated: Vec<Vec<u8>> =
            cursor.iter_prefix(&prefix).map(|r| r.unwrap().0).collect();
        prop_assert_eq!(iterated, expected);
    }

    /// Test that duplicate values come back sorted and deduplicated.
    #[test]
    fn dupsort_values_correctness(
        key in arb_safe_key(),
        values in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..20),
    ) {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init_with_flags(&txn, None, DatabaseFlags::DUP_SORT, true).unwrap();

        for value in &values {
            db.write(&mut txn, &key, value, OverwritePolicy::AllowOverwrite).unwrap();
        }
        let expected: Vec<Vec<u8>> =
            values.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();

        let mut cursor = db.new_cursor(&txn).unwrap();
        let got: Vec<Vec<u8>> = cursor.iter_dup_of(&key).map(|r| r.unwrap().1).collect();
        prop_assert_eq!(&got, &expected);

        prop_assert!(cursor.get(&key).unwrap());
        prop_assert_eq!(cursor.count_dups().unwrap(), expected.len());
        prop_assert!(cursor.last_dup().unwrap());
        prop_assert_eq!(cursor.value().unwrap(), expected[expected.len() - 1].as_slice());
    }
}
