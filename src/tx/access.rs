use std::{cell::Cell, fmt};

/// Owned raw transaction pointer.
///
/// Aborts the engine transaction on drop unless it was already finished.
/// The type is neither `Send` nor `Sync`: engine write transactions are
/// bound to the thread that began them.
pub(crate) struct TxPtr {
    ptr: *mut ffi::MDB_txn,
    finished: Cell<bool>,
}

impl fmt::Debug for TxPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxPtr").field("finished", &self.finished.get()).finish()
    }
}

impl TxPtr {
    pub(crate) const fn new(ptr: *mut ffi::MDB_txn) -> Self {
        Self { ptr, finished: Cell::new(false) }
    }

    /// The raw pointer. Must not be used once [`Self::is_finished`].
    #[inline(always)]
    pub(crate) const fn as_ptr(&self) -> *mut ffi::MDB_txn {
        self.ptr
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Commits the transaction. The engine frees it whether or not the
    /// commit succeeds, so it is finished afterwards either way.
    pub(crate) fn commit(&self) -> i32 {
        debug_assert!(!self.is_finished());
        self.finished.set(true);
        // SAFETY: the pointer is live until marked finished.
        unsafe { ffi::mdb_txn_commit(self.ptr) }
    }

    /// Aborts the transaction if it is still live.
    pub(crate) fn abort(&self) {
        if !self.finished.replace(true) {
            // SAFETY: the pointer is live until marked finished.
            unsafe { ffi::mdb_txn_abort(self.ptr) };
        }
    }
}

impl Drop for TxPtr {
    fn drop(&mut self) {
        self.abort();
    }
}
