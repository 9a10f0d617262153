//! Utility functions for benchmarks.
#![allow(dead_code, unreachable_pub)]

use signet_lmdb::{
    Database, Environment, OverwritePolicy,
    ffi::{MDB_RDONLY, MDB_env, MDB_txn, mdb_txn_begin},
};
use std::ptr;
use tempfile::{TempDir, tempdir};

/// Name of the named benchmark database.
pub const NAMED_DB: &str = "named_benchmark_db";

/// Generate a DB key string for testing.
pub fn get_key(n: u32) -> String {
    format!("key{n:08}")
}

// Generate a DB data string for testing.
pub fn get_data(n: u32) -> String {
    format!("data{n}")
}

/// Create a raw read-only transaction from an environment pointer.
///
/// # Safety
///
/// The caller must ensure `env` is a valid environment pointer.
#[inline(always)]
pub unsafe fn create_ro_raw(env: *mut MDB_env) -> *mut MDB_txn {
    let mut txn: *mut MDB_txn = ptr::null_mut();
    // SAFETY: Caller guarantees env is valid.
    unsafe { mdb_txn_begin(env, ptr::null_mut(), MDB_RDONLY, &mut txn) };
    txn
}

/// Create a raw read-write transaction from an environment pointer.
///
/// # Safety
///
/// The caller must ensure `env` is a valid environment pointer.
#[inline(always)]
pub unsafe fn create_rw_raw(env: *mut MDB_env) -> *mut MDB_txn {
    let mut txn: *mut MDB_txn = ptr::null_mut();
    // SAFETY: Caller guarantees env is valid.
    unsafe { mdb_txn_begin(env, ptr::null_mut(), 0, &mut txn) };
    txn
}

/// Create a temporary benchmark environment with `num_rows` rows in the
/// main database and in [`NAMED_DB`].
///
/// Returns the main database handle. The named database adds one metadata
/// entry to the main database, so it holds `num_rows + 1` entries.
pub fn setup_bench_db(num_rows: u32) -> (TempDir, Environment, Database) {
    let dir = tempdir().unwrap();
    let env = Environment::builder().set_max_dbs(2).open(dir.path()).unwrap();

    let mut txn = env.begin_rw_txn().unwrap();
    let db = Database::init(&txn, None, true).unwrap();
    for i in 0..num_rows {
        db.write(&mut txn, get_key(i), get_data(i), OverwritePolicy::AllowOverwrite).unwrap();
    }

    let named_db = Database::init(&txn, Some(NAMED_DB), true).unwrap();
    for i in 0..num_rows {
        named_db
            .write(&mut txn, get_key(i), get_data(i), OverwritePolicy::AllowOverwrite)
            .unwrap();
    }
    txn.commit().unwrap();

    (dir, env, db)
}
