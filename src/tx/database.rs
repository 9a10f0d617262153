use crate::{
    ByteSpan, Cursor, DatabaseFlags, Environment, LmdbError, LmdbResult, OverwritePolicy, Stat,
    Transaction,
    tx::ops,
};
use std::ffi::CString;
use tracing::debug;

/// A handle to an individual database in an environment.
///
/// A database handle denotes the name and parameters of a database in an
/// environment. It is a plain token: every call validates it against the
/// environment's handle registry, so a handle that was closed, discarded by
/// an aborted transaction, or taken from another environment yields
/// [`LmdbError::StaleDatabase`] instead of touching the engine.
///
/// Handles resolved by [`Database::init`] become usable by other
/// transactions once the resolving transaction commits, and stay usable
/// until [`Database::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Database {
    dbi: ffi::MDB_dbi,
    flags: DatabaseFlags,
    env_id: u64,
    generation: u64,
}

impl Database {
    pub(crate) const fn new(
        dbi: ffi::MDB_dbi,
        flags: DatabaseFlags,
        env_id: u64,
        generation: u64,
    ) -> Self {
        Self { dbi, flags, env_id, generation }
    }

    /// Resolves the database `name` inside `txn`, creating it if it does not
    /// exist and `create_if_missing` is set. `None` names the main database.
    ///
    /// Fails with [`LmdbError::DatabaseOpen`] when the name is unknown and
    /// may not be created, or when the environment's named database limit
    /// is reached. Creating requires a read-write transaction.
    pub fn init(txn: &Transaction<'_>, name: Option<&str>, create_if_missing: bool) -> LmdbResult<Self> {
        Self::init_with_flags(txn, name, DatabaseFlags::empty(), create_if_missing)
    }

    /// Like [`Database::init`], creating the database with `flags` if it does
    /// not exist. An existing database keeps the flags it was created with.
    pub fn init_with_flags(
        txn: &Transaction<'_>,
        name: Option<&str>,
        flags: DatabaseFlags,
        create_if_missing: bool,
    ) -> LmdbResult<Self> {
        if create_if_missing {
            txn.require_writable()?;
        }
        let open_failed = |code| LmdbError::DatabaseOpen { name: name.map(str::to_owned), code };

        let env = txn.env();
        let mut registry = env.registry();
        if let Some(db) = registry.lookup(name, txn.stamp())? {
            txn.remember(db);
            return Ok(db);
        }

        let c_name = name
            .map(CString::new)
            .transpose()
            .map_err(|_| open_failed(ffi::MDB_BAD_VALSIZE))?;

        let mut raw_flags = flags.bits();
        if create_if_missing {
            raw_flags |= ffi::MDB_CREATE;
        }

        // The registry lock serializes every engine handle open.
        let (dbi, actual) = unsafe {
            let dbi = ops::dbi_open_raw(txn.txn_ptr(), c_name.as_deref(), raw_flags)
                .map_err(|e| open_failed(e.to_err_code().unwrap_or_default()))?;
            let actual = ops::dbi_flags_raw(txn.txn_ptr(), dbi)?;
            (dbi, DatabaseFlags::from_bits_truncate(actual))
        };

        let db = registry.register(name, dbi, actual, env.id(), txn.stamp().serial);
        drop(registry);

        debug!(target: "signet_lmdb", parent: txn.span(), ?name, dbi, "database opened");
        txn.remember(db);
        Ok(db)
    }

    /// Stores `value` under `key`.
    ///
    /// With [`OverwritePolicy::NoOverwrite`] an existing key fails with
    /// [`LmdbError::KeyExists`] and keeps its value. With
    /// [`OverwritePolicy::AllowOverwrite`] the value is replaced, or on a
    /// [`DatabaseFlags::DUP_SORT`] database added as another duplicate.
    pub fn write(
        &self,
        txn: &mut Transaction<'_>,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        policy: OverwritePolicy,
    ) -> LmdbResult<()> {
        txn.require_writable()?;
        txn.validate(self)?;
        unsafe {
            ops::put_raw(txn.txn_ptr(), self.dbi, key.as_ref(), value.as_ref(), policy.make_flags())
        }
    }

    /// Looks up `key`. An absent key is `Ok(None)`.
    ///
    /// On a [`DatabaseFlags::DUP_SORT`] database this is the first duplicate.
    pub fn get<'t>(
        &self,
        txn: &'t Transaction<'_>,
        key: impl AsRef<[u8]>,
    ) -> LmdbResult<Option<ByteSpan<'t>>> {
        txn.validate(self)?;
        unsafe { ops::get_raw(txn.txn_ptr(), self.dbi, key.as_ref()) }
    }

    /// Deletes `key` and, on a [`DatabaseFlags::DUP_SORT`] database, all of
    /// its values. An absent key fails with [`LmdbError::KeyNotFound`].
    pub fn delete(&self, txn: &mut Transaction<'_>, key: impl AsRef<[u8]>) -> LmdbResult<()> {
        txn.require_writable()?;
        txn.validate(self)?;
        unsafe { ops::del_raw(txn.txn_ptr(), self.dbi, key.as_ref(), None) }
    }

    /// Deletes one duplicate `value` of `key`.
    pub fn delete_value(
        &self,
        txn: &mut Transaction<'_>,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> LmdbResult<()> {
        if !self.allows_duplicates() {
            return Err(LmdbError::RequiresDupSort);
        }
        txn.require_writable()?;
        txn.validate(self)?;
        unsafe { ops::del_raw(txn.txn_ptr(), self.dbi, key.as_ref(), Some(value.as_ref())) }
    }

    /// Removes every item, keeping the database and its handle.
    pub fn clear(&self, txn: &mut Transaction<'_>) -> LmdbResult<()> {
        txn.require_writable()?;
        txn.validate(self)?;
        unsafe { ops::clear_raw(txn.txn_ptr(), self.dbi) }
    }

    /// Statistics as seen by `txn`.
    pub fn stat(&self, txn: &Transaction<'_>) -> LmdbResult<Stat> {
        txn.validate(self)?;
        unsafe { ops::stat_raw(txn.txn_ptr(), self.dbi) }
    }

    /// Opens a cursor over this database. The cursor starts unpositioned.
    pub fn new_cursor<'t>(&self, txn: &'t Transaction<'_>) -> LmdbResult<Cursor<'t>> {
        txn.validate(self)?;
        Cursor::new(txn, *self)
    }

    /// Name the database was resolved under, `None` for the main database.
    pub fn name(&self, env: &Environment) -> LmdbResult<Option<String>> {
        if self.env_id != env.id() {
            return Err(LmdbError::StaleDatabase);
        }
        env.registry().name_of(self)
    }

    /// Closes the handle.
    ///
    /// Exclusive access to `env` guarantees no transaction is using it.
    /// Closing a handle twice, or one opened by a transaction that never
    /// committed, fails with [`LmdbError::StaleDatabase`].
    pub fn close(self, env: &mut Environment) -> LmdbResult<()> {
        if self.env_id != env.id() || !env.registry().remove(&self) {
            return Err(LmdbError::StaleDatabase);
        }
        // SAFETY: no transaction can be live while env is borrowed mutably.
        unsafe { ffi::mdb_dbi_close(env.env_ptr(), self.dbi) };
        debug!(target: "signet_lmdb", dbi = self.dbi, "database closed");
        Ok(())
    }

    /// Whether multiple values may share one key.
    pub const fn allows_duplicates(&self) -> bool {
        self.flags.allows_duplicates()
    }

    /// Returns the underlying engine database handle.
    ///
    /// The caller **must** ensure that the handle is not used after the
    /// lifetime of the environment, or after the database has been closed.
    pub const fn dbi(&self) -> ffi::MDB_dbi {
        self.dbi
    }

    /// Returns the flags of the database.
    pub const fn flags(&self) -> DatabaseFlags {
        self.flags
    }

    pub(crate) const fn env_id(&self) -> u64 {
        self.env_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_only_transaction_refuses_writes() {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let db = {
            let txn = env.begin_rw_txn().unwrap();
            let db = Database::init(&txn, None, true).unwrap();
            txn.commit().unwrap();
            db
        };

        let mut txn = env.begin_ro_txn().unwrap();
        assert_eq!(
            db.write(&mut txn, b"k", b"v", OverwritePolicy::AllowOverwrite),
            Err(LmdbError::ReadOnlyViolation)
        );
        assert_eq!(db.delete(&mut txn, b"k"), Err(LmdbError::ReadOnlyViolation));
        assert_eq!(db.clear(&mut txn), Err(LmdbError::ReadOnlyViolation));
        assert_eq!(Database::init(&txn, None, true), Err(LmdbError::ReadOnlyViolation));
    }

    #[test]
    fn delete_value_needs_dup_sort() {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();
        assert!(!db.allows_duplicates());
        assert_eq!(db.delete_value(&mut txn, b"k", b"v"), Err(LmdbError::RequiresDupSort));
    }

    #[test]
    fn clear_and_stat() {
        let dir = tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = Database::init(&txn, None, true).unwrap();
        for i in 0..10u8 {
            db.write(&mut txn, [i], [i], OverwritePolicy::NoOverwrite).unwrap();
        }
        assert_eq!(db.stat(&txn).unwrap().entries(), 10);
        db.clear(&mut txn).unwrap();
        assert_eq!(db.stat(&txn).unwrap().entries(), 0);
        assert!(db.get(&txn, [3u8]).unwrap().is_none());
    }
}
