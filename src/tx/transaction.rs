use crate::{
    Cursor, Database, Environment, LmdbError, LmdbResult, TxnMode,
    error::lmdb_result,
    sys::writer::WriterToken,
    tx::{
        access::TxPtr,
        cache::{TxCache, TxnStamp},
    },
};
use std::{fmt, ptr};
use tracing::{debug, debug_span, instrument, warn};

/// An LMDB transaction.
///
/// A transaction is either [`TxnMode::ReadOnly`], pinned to the snapshot
/// visible when it began, or [`TxnMode::ReadWrite`], of which an
/// environment has at most one active at a time.
///
/// [`Transaction::commit`] and [`Transaction::abort`] consume the
/// transaction. Dropping an active transaction aborts it.
///
/// Reads return [`ByteSpan`]s borrowing the transaction; writes take it by
/// `&mut`, so no span can be observed across a write.
///
/// [`ByteSpan`]: crate::ByteSpan
pub struct Transaction<'env> {
    txn: TxPtr,
    mode: TxnMode,
    stamp: TxnStamp,
    env: &'env Environment,
    cache: TxCache,
    span: tracing::Span,
    /// Released after `txn` is finished.
    _writer: Option<WriterToken<'env>>,
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("serial", &self.stamp.serial)
            .finish_non_exhaustive()
    }
}

impl<'env> Transaction<'env> {
    /// Begins an engine transaction. Read-write callers pass the writer
    /// token they already hold; it is released if the begin fails.
    pub(crate) fn begin(
        env: &'env Environment,
        mode: TxnMode,
        writer: Option<WriterToken<'env>>,
    ) -> LmdbResult<Self> {
        // The epoch must be read before the engine snapshots its handle table.
        let epoch = env.registry().epoch();
        let serial = env.next_serial();

        let mut txn: *mut ffi::MDB_txn = ptr::null_mut();
        lmdb_result(unsafe {
            ffi::mdb_txn_begin(env.env_ptr(), ptr::null_mut(), mode.make_flags(), &mut txn)
        })?;

        let span = debug_span!(target: "signet_lmdb", "lmdb_txn", mode = ?mode, serial);
        debug!(target: "signet_lmdb", parent: &span, "transaction started");

        Ok(Self {
            txn: TxPtr::new(txn),
            mode,
            stamp: TxnStamp { serial, epoch },
            env,
            cache: TxCache::default(),
            span,
            _writer: writer,
        })
    }

    /// The transaction mode.
    pub const fn mode(&self) -> TxnMode {
        self.mode
    }

    /// Whether this is a read-only transaction.
    pub const fn is_read_only(&self) -> bool {
        self.mode.is_read_only()
    }

    /// Returns a reference to the environment.
    #[inline(always)]
    pub const fn env(&self) -> &'env Environment {
        self.env
    }

    /// Returns the tracing span for this transaction.
    #[inline(always)]
    pub const fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Returns a raw pointer to the underlying engine transaction.
    ///
    /// The caller **must** ensure that the pointer is not used after the
    /// lifetime of the transaction.
    #[inline(always)]
    pub const fn txn_ptr(&self) -> *mut ffi::MDB_txn {
        self.txn.as_ptr()
    }

    /// Opens a cursor over `db`. Shorthand for [`Database::new_cursor`].
    pub fn cursor(&self, db: Database) -> LmdbResult<Cursor<'_>> {
        db.new_cursor(self)
    }

    /// Commits the transaction.
    ///
    /// For a read-write transaction every write becomes visible to
    /// transactions created afterwards. If the engine cannot apply the write
    /// set the call fails with [`LmdbError::CommitConflict`] and nothing is
    /// applied. For a read-only transaction this releases the snapshot.
    ///
    /// Database handles opened inside the transaction are published to the
    /// environment on success and discarded on failure.
    #[instrument(skip(self), parent = &self.span)]
    pub fn commit(self) -> LmdbResult<()> {
        let rc = self.txn.commit();
        let committed = rc == ffi::MDB_SUCCESS;
        self.env.registry().finish(self.stamp.serial, committed);

        if !committed {
            let err = LmdbError::CommitConflict(rc);
            warn!(target: "signet_lmdb", %err, "commit failed");
            return Err(err);
        }
        Ok(())
    }

    /// Aborts the transaction, discarding its writes or releasing its
    /// snapshot. Never fails.
    pub fn abort(self) {
        self.finish_aborted();
        debug!(target: "signet_lmdb", parent: &self.span, "aborted");
    }

    fn finish_aborted(&self) {
        self.txn.abort();
        self.env.registry().finish(self.stamp.serial, false);
    }

    /// Fails unless the transaction may write.
    #[inline]
    pub(crate) const fn require_writable(&self) -> LmdbResult<()> {
        if self.mode.is_read_only() {
            return Err(LmdbError::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Checks that `db` belongs to this environment and may be used by this
    /// transaction.
    pub(crate) fn validate(&self, db: &Database) -> LmdbResult<()> {
        if db.env_id() != self.env.id() {
            return Err(LmdbError::StaleDatabase);
        }
        if self.cache.contains(db) {
            return Ok(());
        }
        self.env.registry().check(db, self.stamp)?;
        self.cache.insert(*db);
        Ok(())
    }

    pub(crate) const fn stamp(&self) -> TxnStamp {
        self.stamp
    }

    pub(crate) fn remember(&self, db: Database) {
        self.cache.insert(db);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.txn.is_finished() {
            return;
        }
        self.finish_aborted();
        debug!(target: "signet_lmdb", parent: &self.span, "implicit abort");
    }
}
