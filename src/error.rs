use std::{
    ffi::{CStr, c_int},
    path::PathBuf,
};

/// An LMDB result.
pub type LmdbResult<T> = Result<T, LmdbError>;

/// Broad classification of an [`LmdbError`].
///
/// Callers branch on the kind to decide whether to retry, skip, or abort the
/// surrounding transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Environment or database could not be opened with the given
    /// parameters. Fatal to the attempted handle only.
    Configuration,
    /// A concurrency limit was hit. Retry after backoff or after the
    /// conflicting transaction ends.
    ConcurrencyLimit,
    /// An expected outcome such as a missing or duplicate key. Not a fault.
    Expected,
    /// The transaction's write set could not be applied. Its effects are
    /// discarded in full.
    Integrity,
    /// The caller broke a handle contract.
    ContractViolation,
    /// Any other engine failure.
    Engine,
}

/// Why an environment failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OpenFailure {
    /// The requested map size is below [`MIN_MAP_SIZE`].
    ///
    /// [`MIN_MAP_SIZE`]: crate::sys::MIN_MAP_SIZE
    #[error("map size {requested} is below the minimum of {minimum} bytes")]
    MapSizeTooSmall {
        /// Requested size in bytes.
        requested: usize,
        /// Engine minimum in bytes.
        minimum: usize,
    },
    /// Another environment in this process already holds the path.
    #[error("path is already open by another environment in this process")]
    PathInUse,
    /// The path could not be prepared or resolved.
    #[error("path is inaccessible: {}", describe_code(*.0))]
    Inaccessible(i32),
    /// The engine refused to open the environment.
    #[error("{}", describe_code(*.0))]
    Engine(i32),
}

/// An LMDB error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LmdbError {
    /// The environment could not be opened.
    #[error("failed to open environment at {}: {}", .path.display(), .reason)]
    StorageOpen {
        /// Path passed to open.
        path: PathBuf,
        /// What went wrong.
        reason: OpenFailure,
    },
    /// A database could not be opened or created.
    #[error("failed to open database {:?}: {}", .name, describe_code(*.code))]
    DatabaseOpen {
        /// Database name, `None` for the main database.
        name: Option<String>,
        /// Engine error code.
        code: i32,
    },
    /// All reader slots are in use.
    #[error("environment maxreaders reached")]
    TransactionLimit,
    /// Another read-write transaction is active.
    #[error("another read-write transaction is active")]
    WriterBusy,
    /// Another transaction holds uncommitted database opens.
    #[error("another transaction is opening databases, retry after it ends")]
    DatabaseInitBusy,
    /// Commit failed. Nothing written by the transaction was applied.
    #[error("commit failed, transaction discarded: {}", describe_code(*.0))]
    CommitConflict(i32),
    /// Key/data pair already exists.
    #[error("key/data pair already exists")]
    KeyExists,
    /// No matching key/data pair found.
    #[error("no matching key/data pair found")]
    KeyNotFound,
    /// Write attempted inside a read-only transaction or environment.
    #[error("write attempted inside a read-only transaction")]
    ReadOnlyViolation,
    /// Cursor accessor used while the cursor is not positioned.
    #[error("cursor is not positioned")]
    CursorUnpositioned,
    /// Database handle was closed, discarded by an abort, or belongs to
    /// another environment.
    #[error("database handle is stale or belongs to another environment")]
    StaleDatabase,
    /// Environment closed while databases were still open.
    #[error("{0} database handle(s) still open")]
    DatabasesStillOpen(usize),
    /// Operation needs a database that allows duplicates.
    #[error("operation requires a database with DUP_SORT")]
    RequiresDupSort,
    /// Requested page not found - this usually indicates corruption.
    #[error("requested page not found")]
    PageNotFound,
    /// Database is corrupted.
    #[error("database is corrupted")]
    Corrupted,
    /// Environment had a fatal error.
    #[error("environment had a fatal error")]
    Panic,
    /// DB file version mismatch with the engine.
    #[error("database version mismatch")]
    VersionMismatch,
    /// File is not a valid LMDB file.
    #[error("file is not a valid LMDB file")]
    Invalid,
    /// Environment mapsize reached.
    #[error("environment mapsize reached")]
    MapFull,
    /// Environment maxdbs reached.
    #[error("environment maxdbs reached")]
    DbsFull,
    /// Too many TLS keys in use.
    #[error("too many TLS keys in use")]
    TlsFull,
    /// Transaction has too many dirty pages.
    #[error("transaction has too many dirty pages")]
    TxnFull,
    /// Cursor stack too deep.
    #[error("cursor stack too deep")]
    CursorFull,
    /// Page has not enough space.
    #[error("page has not enough space")]
    PageFull,
    /// Database contents grew beyond environment mapsize.
    #[error("database contents grew beyond environment mapsize")]
    MapResized,
    /// Operation and database incompatible.
    #[error("operation and database incompatible")]
    Incompatible,
    /// Invalid reuse of reader locktable slot.
    #[error("invalid reuse of reader locktable slot")]
    BadRslot,
    /// Transaction must abort, has a child, or is invalid.
    #[error("transaction must abort, has a child, or is invalid")]
    BadTxn,
    /// Unsupported size of key/DB name/data, or wrong DUP_FIXED size.
    #[error("unsupported size of key/DB name/data, or wrong DUP_FIXED size")]
    BadValSize,
    /// The specified DBI was changed unexpectedly.
    #[error("the specified DBI was changed unexpectedly")]
    BadDbi,
    /// Unknown error code.
    #[error("unknown error code {}: {}", .0, describe_code(*.0))]
    Other(i32),
}

impl LmdbError {
    /// Converts a raw error code to an [`LmdbError`].
    pub const fn from_err_code(err_code: c_int) -> Self {
        match err_code {
            ffi::MDB_KEYEXIST => Self::KeyExists,
            ffi::MDB_NOTFOUND => Self::KeyNotFound,
            ffi::MDB_READERS_FULL => Self::TransactionLimit,
            ffi::MDB_PAGE_NOTFOUND => Self::PageNotFound,
            ffi::MDB_CORRUPTED => Self::Corrupted,
            ffi::MDB_PANIC => Self::Panic,
            ffi::MDB_VERSION_MISMATCH => Self::VersionMismatch,
            ffi::MDB_INVALID => Self::Invalid,
            ffi::MDB_MAP_FULL => Self::MapFull,
            ffi::MDB_DBS_FULL => Self::DbsFull,
            ffi::MDB_TLS_FULL => Self::TlsFull,
            ffi::MDB_TXN_FULL => Self::TxnFull,
            ffi::MDB_CURSOR_FULL => Self::CursorFull,
            ffi::MDB_PAGE_FULL => Self::PageFull,
            ffi::MDB_MAP_RESIZED => Self::MapResized,
            ffi::MDB_INCOMPATIBLE => Self::Incompatible,
            ffi::MDB_BAD_RSLOT => Self::BadRslot,
            ffi::MDB_BAD_TXN => Self::BadTxn,
            ffi::MDB_BAD_VALSIZE => Self::BadValSize,
            ffi::MDB_BAD_DBI => Self::BadDbi,
            other => Self::Other(other),
        }
    }

    /// Converts an [`LmdbError`] back to the raw engine error code, where one
    /// exists. Errors raised by this crate rather than the engine return
    /// `None`.
    pub const fn to_err_code(&self) -> Option<i32> {
        let code = match self {
            Self::KeyExists => ffi::MDB_KEYEXIST,
            Self::KeyNotFound => ffi::MDB_NOTFOUND,
            Self::TransactionLimit => ffi::MDB_READERS_FULL,
            Self::PageNotFound => ffi::MDB_PAGE_NOTFOUND,
            Self::Corrupted => ffi::MDB_CORRUPTED,
            Self::Panic => ffi::MDB_PANIC,
            Self::VersionMismatch => ffi::MDB_VERSION_MISMATCH,
            Self::Invalid => ffi::MDB_INVALID,
            Self::MapFull => ffi::MDB_MAP_FULL,
            Self::DbsFull => ffi::MDB_DBS_FULL,
            Self::TlsFull => ffi::MDB_TLS_FULL,
            Self::TxnFull => ffi::MDB_TXN_FULL,
            Self::CursorFull => ffi::MDB_CURSOR_FULL,
            Self::PageFull => ffi::MDB_PAGE_FULL,
            Self::MapResized => ffi::MDB_MAP_RESIZED,
            Self::Incompatible => ffi::MDB_INCOMPATIBLE,
            Self::BadRslot => ffi::MDB_BAD_RSLOT,
            Self::BadTxn => ffi::MDB_BAD_TXN,
            Self::BadValSize => ffi::MDB_BAD_VALSIZE,
            Self::BadDbi => ffi::MDB_BAD_DBI,
            Self::CommitConflict(code) | Self::Other(code) => *code,
            Self::DatabaseOpen { code, .. } => *code,
            _ => return None,
        };
        Some(code)
    }

    /// Classifies the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageOpen { .. } | Self::DatabaseOpen { .. } => ErrorKind::Configuration,
            Self::TransactionLimit | Self::WriterBusy | Self::DatabaseInitBusy => {
                ErrorKind::ConcurrencyLimit
            }
            Self::KeyExists | Self::KeyNotFound => ErrorKind::Expected,
            Self::CommitConflict(_)
            | Self::MapFull
            | Self::TxnFull
            | Self::Corrupted
            | Self::PageNotFound
            | Self::Panic => ErrorKind::Integrity,
            Self::ReadOnlyViolation
            | Self::CursorUnpositioned
            | Self::StaleDatabase
            | Self::DatabasesStillOpen(_)
            | Self::RequiresDupSort
            | Self::BadTxn
            | Self::BadDbi
            | Self::BadRslot => ErrorKind::ContractViolation,
            _ => ErrorKind::Engine,
        }
    }

    /// Whether the caller may retry the same operation later.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ConcurrencyLimit)
    }
}

/// Maps an engine return code to a result.
#[inline]
pub(crate) const fn lmdb_result(err_code: c_int) -> LmdbResult<()> {
    if err_code == ffi::MDB_SUCCESS { Ok(()) } else { Err(LmdbError::from_err_code(err_code)) }
}

/// Human readable description of an engine or OS error code.
pub(crate) fn describe_code(code: i32) -> String {
    // SAFETY: mdb_strerror returns a pointer to a static or thread-local
    // NUL-terminated string for every input.
    let msg = unsafe { ffi::mdb_strerror(code) };
    if msg.is_null() {
        return format!("error code {code}");
    }
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description() {
        assert_eq!("key/data pair already exists", LmdbError::from_err_code(-30799).to_string());
        assert_eq!("environment maxreaders reached", LmdbError::from_err_code(-30790).to_string());
        assert!(LmdbError::Other(12345).to_string().starts_with("unknown error code 12345: "));
        let err = LmdbError::DatabaseOpen { name: Some("users".into()), code: ffi::MDB_NOTFOUND };
        assert!(err.to_string().starts_with("failed to open database Some(\"users\"): "));
    }

    #[test]
    fn test_round_trip_codes() {
        for code in [ffi::MDB_KEYEXIST, ffi::MDB_NOTFOUND, ffi::MDB_MAP_FULL, ffi::MDB_BAD_TXN] {
            assert_eq!(LmdbError::from_err_code(code).to_err_code(), Some(code));
        }
        assert_eq!(LmdbError::from_err_code(12345), LmdbError::Other(12345));
        assert_eq!(LmdbError::WriterBusy.to_err_code(), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(LmdbError::KeyExists.kind(), ErrorKind::Expected);
        assert_eq!(LmdbError::KeyNotFound.kind(), ErrorKind::Expected);
        assert_eq!(LmdbError::CommitConflict(ffi::MDB_MAP_FULL).kind(), ErrorKind::Integrity);
        assert_eq!(LmdbError::CursorUnpositioned.kind(), ErrorKind::ContractViolation);
        assert!(LmdbError::WriterBusy.is_retryable());
        assert!(LmdbError::TransactionLimit.is_retryable());
        assert!(!LmdbError::KeyExists.is_retryable());
        assert!(lmdb_result(ffi::MDB_SUCCESS).is_ok());
    }
}
