use crate::{
    ByteSpan, Database, DatabaseFlags, LmdbError, LmdbResult, Transaction,
    error::lmdb_result,
    tx::{
        iter::{Iter, Start},
        ops::{empty_val, slice_to_val},
    },
};
use ffi::{
    MDB_FIRST, MDB_FIRST_DUP, MDB_GET_CURRENT, MDB_LAST, MDB_LAST_DUP, MDB_NEXT, MDB_NEXT_DUP,
    MDB_NEXT_NODUP, MDB_PREV, MDB_PREV_DUP, MDB_PREV_NODUP, MDB_SET, MDB_SET_KEY, MDB_SET_RANGE,
    MDB_cursor_op,
};
use std::{fmt, ptr};

/// A cursor positioning operation.
///
/// Operations that take a key carry it, so a positioning request is always
/// complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOp<'k> {
    /// Position at the first key.
    First,
    /// Position at the first duplicate of the current key.
    FirstDup,
    /// Position at the last key.
    Last,
    /// Position at the last duplicate of the current key.
    LastDup,
    /// Position at the next entry, including duplicates.
    Next,
    /// Position at the next duplicate of the current key.
    NextDup,
    /// Position at the first duplicate of the next key.
    NextNoDup,
    /// Position at the previous entry, including duplicates.
    Prev,
    /// Position at the previous duplicate of the current key.
    PrevDup,
    /// Position at the last duplicate of the previous key.
    PrevNoDup,
    /// Position at exactly this key.
    Set(&'k [u8]),
    /// Position at exactly this key. Same as [`CursorOp::Set`].
    SetKey(&'k [u8]),
    /// Position at the smallest key greater than or equal to this one.
    SetRange(&'k [u8]),
}

impl<'k> CursorOp<'k> {
    const fn raw(self) -> (MDB_cursor_op, Option<&'k [u8]>) {
        match self {
            Self::First => (MDB_FIRST, None),
            Self::FirstDup => (MDB_FIRST_DUP, None),
            Self::Last => (MDB_LAST, None),
            Self::LastDup => (MDB_LAST_DUP, None),
            Self::Next => (MDB_NEXT, None),
            Self::NextDup => (MDB_NEXT_DUP, None),
            Self::NextNoDup => (MDB_NEXT_NODUP, None),
            Self::Prev => (MDB_PREV, None),
            Self::PrevDup => (MDB_PREV_DUP, None),
            Self::PrevNoDup => (MDB_PREV_NODUP, None),
            Self::Set(key) => (MDB_SET, Some(key)),
            Self::SetKey(key) => (MDB_SET_KEY, Some(key)),
            Self::SetRange(key) => (MDB_SET_RANGE, Some(key)),
        }
    }

    /// Whether the operation moves within the duplicates of the current key.
    pub const fn is_dup_only(self) -> bool {
        matches!(self, Self::FirstDup | Self::LastDup | Self::NextDup | Self::PrevDup)
    }

    /// Whether the operation moves relative to the current position.
    pub const fn is_relative(self) -> bool {
        matches!(self, Self::Next | Self::NextNoDup | Self::Prev | Self::PrevNoDup)
            || self.is_dup_only()
    }
}

/// Where the cursor stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// No positioning call yet. Next and Prev start from the ends.
    Unpositioned,
    /// The last positioning call found an entry.
    Positioned,
    /// A duplicate-only move ran off the current key. The engine cursor
    /// still rests on that key, so relative moves continue from it.
    Anchored,
    /// A seek or a key-to-key move found nothing. Relative moves stay
    /// invalid until an absolute positioning call.
    Exhausted,
}

/// A cursor for navigating the items within a database.
///
/// Each cursor has its own position, even over the same database and
/// transaction. [`Cursor::valid`] is true exactly when the most recent
/// positioning call found an entry; [`Cursor::key`] and [`Cursor::value`]
/// fail with [`LmdbError::CursorUnpositioned`] otherwise.
///
/// The cursor borrows its transaction, which therefore cannot commit, abort,
/// or write while the cursor lives.
pub struct Cursor<'txn> {
    txn: &'txn Transaction<'txn>,
    cursor: *mut ffi::MDB_cursor,
    db: Database,
    position: Position,
    key: ffi::MDB_val,
    data: ffi::MDB_val,
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("db", &self.db)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl<'txn> Cursor<'txn> {
    pub(crate) fn new(txn: &'txn Transaction<'_>, db: Database) -> LmdbResult<Self> {
        let mut cursor: *mut ffi::MDB_cursor = ptr::null_mut();
        lmdb_result(unsafe { ffi::mdb_cursor_open(txn.txn_ptr(), db.dbi(), &mut cursor) })?;
        Ok(Self {
            txn,
            cursor,
            db,
            position: Position::Unpositioned,
            key: empty_val(),
            data: empty_val(),
        })
    }

    /// Returns the transaction associated with this cursor.
    pub const fn txn(&self) -> &'txn Transaction<'txn> {
        self.txn
    }

    /// Returns a raw pointer to the underlying engine cursor.
    ///
    /// The caller **must** ensure that the pointer is not used after the
    /// lifetime of the cursor.
    pub const fn cursor(&self) -> *mut ffi::MDB_cursor {
        self.cursor
    }

    /// Returns the database associated with this cursor.
    pub const fn db(&self) -> Database {
        self.db
    }

    /// Returns the flags of the database associated with this cursor.
    pub const fn db_flags(&self) -> DatabaseFlags {
        self.db.flags()
    }

    /// Whether the last positioning call found an entry.
    pub fn valid(&self) -> bool {
        self.position == Position::Positioned
    }

    /// Validates that the database has the DUP_SORT flag set.
    #[inline(always)]
    fn require_dup_sort(&self) -> LmdbResult<()> {
        self.db.allows_duplicates().then_some(()).ok_or(LmdbError::RequiresDupSort)
    }

    /// Runs a positioning operation. Returns whether an entry was found.
    ///
    /// On a cursor that was never positioned, [`CursorOp::Next`] and
    /// [`CursorOp::NextNoDup`] start at the first entry, and
    /// [`CursorOp::Prev`] and [`CursorOp::PrevNoDup`] at the last.
    /// Duplicate-only operations need a current key and fail with
    /// [`LmdbError::CursorUnpositioned`] without one, and with
    /// [`LmdbError::RequiresDupSort`] on a database without duplicates.
    pub fn position(&mut self, op: CursorOp<'_>) -> LmdbResult<bool> {
        if op.is_dup_only() {
            self.require_dup_sort()?;
        }

        let op = match (self.position, op) {
            (Position::Unpositioned | Position::Exhausted, op) if op.is_dup_only() => {
                return Err(LmdbError::CursorUnpositioned);
            }
            (Position::Unpositioned, CursorOp::Next | CursorOp::NextNoDup) => CursorOp::First,
            (Position::Unpositioned, CursorOp::Prev | CursorOp::PrevNoDup) => CursorOp::Last,
            (Position::Exhausted, op) if op.is_relative() => return Ok(false),
            // The engine rejects empty keys. Every key is >= the empty key,
            // and none equals it.
            (_, CursorOp::SetRange([])) => CursorOp::First,
            (_, CursorOp::Set([]) | CursorOp::SetKey([])) => {
                self.key = empty_val();
                self.data = empty_val();
                self.position = Position::Exhausted;
                return Ok(false);
            }
            (_, op) => op,
        };

        let (raw_op, key) = op.raw();
        let mut key_val = key.map_or_else(empty_val, slice_to_val);
        let mut data_val = empty_val();

        let rc = unsafe { ffi::mdb_cursor_get(self.cursor, &mut key_val, &mut data_val, raw_op) };
        match rc {
            ffi::MDB_SUCCESS => {
                if matches!(raw_op, MDB_SET | MDB_FIRST_DUP | MDB_LAST_DUP) {
                    // These leave the key argument as passed, so fetch the
                    // engine's copy.
                    lmdb_result(unsafe {
                        ffi::mdb_cursor_get(self.cursor, &mut key_val, &mut data_val, MDB_GET_CURRENT)
                    })?;
                }
                self.key = key_val;
                self.data = data_val;
                self.position = Position::Positioned;
                Ok(true)
            }
            ffi::MDB_NOTFOUND => {
                self.key = empty_val();
                self.data = empty_val();
                self.position =
                    if op.is_dup_only() { Position::Anchored } else { Position::Exhausted };
                Ok(false)
            }
            err_code => {
                self.position = Position::Exhausted;
                Err(LmdbError::from_err_code(err_code))
            }
        }
    }

    /// Position at the first key.
    pub fn seek_first(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::First)
    }

    /// Position at the last key.
    pub fn seek_last(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::Last)
    }

    /// Position at the smallest key greater than or equal to `key`.
    ///
    /// The cursor is invalid afterwards if there is no such key.
    pub fn seek_to(&mut self, key: impl AsRef<[u8]>) -> LmdbResult<bool> {
        self.position(CursorOp::SetRange(key.as_ref()))
    }

    /// Advance to the next entry.
    pub fn next(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::Next)
    }

    /// Step back to the previous entry.
    pub fn prev(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::Prev)
    }

    /// Position at the first duplicate of the current key.
    pub fn first_dup(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::FirstDup)
    }

    /// Position at the last duplicate of the current key.
    pub fn last_dup(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::LastDup)
    }

    /// Advance to the next duplicate of the current key.
    pub fn next_dup(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::NextDup)
    }

    /// Step back to the previous duplicate of the current key.
    pub fn prev_dup(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::PrevDup)
    }

    /// Advance to the first duplicate of the next key.
    pub fn next_nodup(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::NextNoDup)
    }

    /// Step back to the last duplicate of the previous key.
    pub fn prev_nodup(&mut self) -> LmdbResult<bool> {
        self.position(CursorOp::PrevNoDup)
    }

    /// Position at exactly `key`.
    pub fn get(&mut self, key: impl AsRef<[u8]>) -> LmdbResult<bool> {
        self.position(CursorOp::SetKey(key.as_ref()))
    }

    /// Position at exactly `key`, and confirm the key found is equal to it.
    pub fn has_key(&mut self, key: impl AsRef<[u8]>) -> LmdbResult<bool> {
        let key = key.as_ref();
        Ok(self.position(CursorOp::SetKey(key))? && self.key()? == key)
    }

    /// The current key.
    pub fn key(&self) -> LmdbResult<ByteSpan<'_>> {
        if !self.valid() {
            return Err(LmdbError::CursorUnpositioned);
        }
        // SAFETY: the value points into the transaction's pages, which no
        // write can touch while the cursor borrows the transaction.
        Ok(unsafe { ByteSpan::from_val(&self.key) })
    }

    /// The current value.
    pub fn value(&self) -> LmdbResult<ByteSpan<'_>> {
        if !self.valid() {
            return Err(LmdbError::CursorUnpositioned);
        }
        // SAFETY: see `key`.
        Ok(unsafe { ByteSpan::from_val(&self.data) })
    }

    /// The current entry, if the cursor is positioned.
    pub fn current(&self) -> Option<(ByteSpan<'_>, ByteSpan<'_>)> {
        self.key().ok().zip(self.value().ok())
    }

    /// Number of values stored under the current key.
    pub fn count_dups(&self) -> LmdbResult<usize> {
        self.require_dup_sort()?;
        if !self.valid() {
            return Err(LmdbError::CursorUnpositioned);
        }
        let mut count = 0usize;
        lmdb_result(unsafe { ffi::mdb_cursor_count(self.cursor, &mut count) })?;
        Ok(count)
    }

    /// Iterate over every entry, starting at the first key.
    pub fn iter_start(&mut self) -> Iter<'_, 'txn> {
        Iter::new(self, Start::First, None)
    }

    /// Iterate over entries whose key is greater than or equal to `key`.
    pub fn iter_from(&mut self, key: impl AsRef<[u8]>) -> Iter<'_, 'txn> {
        Iter::new(self, Start::Range(key.as_ref().to_vec()), None)
    }

    /// Iterate over entries whose key starts with `prefix`.
    pub fn iter_prefix(&mut self, prefix: impl AsRef<[u8]>) -> Iter<'_, 'txn> {
        let prefix = prefix.as_ref().to_vec();
        Iter::new(self, Start::Range(prefix.clone()), Some(prefix))
    }

    /// Iterate over the values stored under `key`.
    pub fn iter_dup_of(&mut self, key: impl AsRef<[u8]>) -> Iter<'_, 'txn> {
        Iter::new(self, Start::Exact(key.as_ref().to_vec()), None)
    }

    /// Closes the cursor. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        // SAFETY: the cursor is closed before its transaction can end.
        unsafe { ffi::mdb_cursor_close(self.cursor) }
    }
}
