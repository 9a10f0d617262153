//! Shared fixtures for the integration tests.
//!
//! Each fixture opens a fresh environment in its own temporary directory.
//! The directory must outlive the environment, so both are returned.
#![allow(missing_docs, dead_code)]
use signet_lmdb::{
    Cursor, Database, DatabaseFlags, Environment, EnvironmentBuilder, LmdbResult,
    OverwritePolicy,
};
use tempfile::{TempDir, tempdir};

/// Opens an environment with default settings.
pub fn open_env() -> (TempDir, Environment) {
    open_env_with(|_| {})
}

/// Opens an environment after letting `configure` adjust the builder.
pub fn open_env_with(configure: impl FnOnce(&mut EnvironmentBuilder)) -> (TempDir, Environment) {
    let dir = tempdir().unwrap();
    let mut builder = Environment::builder();
    configure(&mut builder);
    let env = builder.open(dir.path()).unwrap();
    (dir, env)
}

/// Creates the main database with `flags` and publishes it.
pub fn main_db(env: &Environment, flags: DatabaseFlags) -> Database {
    let txn = env.begin_rw_txn().unwrap();
    let db = Database::init_with_flags(&txn, None, flags, true).unwrap();
    txn.commit().unwrap();
    db
}

/// Writes every pair in one committed transaction.
pub fn populate<K, V>(env: &Environment, db: Database, items: impl IntoIterator<Item = (K, V)>)
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut txn = env.begin_rw_txn().unwrap();
    for (key, value) in items {
        db.write(&mut txn, key, value, OverwritePolicy::AllowOverwrite).unwrap();
    }
    txn.commit().unwrap();
}

/// The cursor's current entry as owned UTF-8, for readable assertions.
pub fn entry(cursor: &Cursor<'_>) -> LmdbResult<(String, String)> {
    let key = String::from_utf8_lossy(&cursor.key()?).into_owned();
    let value = String::from_utf8_lossy(&cursor.value()?).into_owned();
    Ok((key, value))
}

/// Converts owned iterator items to UTF-8 pairs.
pub fn utf8_pairs(
    items: impl IntoIterator<Item = LmdbResult<(Vec<u8>, Vec<u8>)>>,
) -> Vec<(String, String)> {
    items
        .into_iter()
        .map(|item| {
            let (k, v) = item.unwrap();
            (String::from_utf8(k).unwrap(), String::from_utf8(v).unwrap())
        })
        .collect()
}

/// Owned `(key, value)` pair from string slices.
pub fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_owned(), value.to_owned())
}
