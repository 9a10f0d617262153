use crate::{
    EnvironmentFlags, LmdbError, LmdbResult, Mode, Transaction, TxnMode, WriterPolicy,
    error::{OpenFailure, lmdb_result},
    sys::{paths::PathLease, writer::WriterGate},
    tx::cache::DbRegistry,
};
use parking_lot::{Mutex, MutexGuard};
use std::{
    ffi::{CString, c_uint},
    fmt, io,
    path::{Path, PathBuf},
    ptr,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, error};

/// Smallest map size an environment may be opened with, in bytes.
pub const MIN_MAP_SIZE: usize = 64 * 1024;

/// Default map size, in bytes.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

/// Default number of reader slots.
pub const DEFAULT_MAX_READERS: u32 = 126;

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// Raw environment pointer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnvPtr(pub(crate) *mut ffi::MDB_env);

// SAFETY: the engine environment is thread-safe; MDB_NOTLS is always set.
unsafe impl Send for EnvPtr {}
unsafe impl Sync for EnvPtr {}

/// An environment supports multiple databases, all residing in the same
/// shared-memory map.
///
/// The environment is the sole owner of the engine instance. Transactions
/// borrow it, so it cannot be dropped while any of them is live.
pub struct Environment {
    env: EnvPtr,
    id: u64,
    flags: EnvironmentFlags,
    writer_policy: WriterPolicy,
    writer: WriterGate,
    dbs: Mutex<DbRegistry>,
    serials: AtomicU64,
    /// Released after the engine instance, since fields drop after `Drop`.
    lease: PathLease,
}

impl Environment {
    /// Creates a new builder for specifying options for opening an
    /// environment.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Opens an environment with explicit limits.
    ///
    /// Equivalent to configuring an [`EnvironmentBuilder`] with the same
    /// values and the default [`WriterPolicy`].
    pub fn open(
        path: impl AsRef<Path>,
        map_size: usize,
        max_readers: u32,
        max_dbs: u32,
        flags: EnvironmentFlags,
    ) -> LmdbResult<Self> {
        Self::builder()
            .set_map_size(map_size)
            .set_max_readers(max_readers)
            .set_max_dbs(max_dbs)
            .set_flags(flags)
            .open(path)
    }

    /// Returns the raw engine environment pointer.
    ///
    /// The caller **must** ensure that the pointer is not used after the
    /// lifetime of the environment.
    #[inline]
    pub const fn env_ptr(&self) -> *mut ffi::MDB_env {
        self.env.0
    }

    /// Process-unique identifier of this environment instance.
    #[inline]
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    /// The canonical path the environment was opened at.
    pub fn path(&self) -> &Path {
        self.lease.path()
    }

    /// Flags the environment was opened with.
    pub const fn flags(&self) -> EnvironmentFlags {
        self.flags
    }

    /// Returns true if the environment was opened read-only.
    pub const fn is_read_only(&self) -> bool {
        self.flags.is_read_only()
    }

    /// What a second read-write transaction does while one is active.
    pub const fn writer_policy(&self) -> WriterPolicy {
        self.writer_policy
    }

    /// Create a transaction in the given mode.
    ///
    /// A [`TxnMode::ReadWrite`] transaction on a read-only environment fails
    /// with [`LmdbError::ReadOnlyViolation`]. While another read-write
    /// transaction is active, the call blocks or fails with
    /// [`LmdbError::WriterBusy`], per [`Self::writer_policy`]. When every
    /// reader slot is taken, a [`TxnMode::ReadOnly`] transaction fails with
    /// [`LmdbError::TransactionLimit`].
    pub fn new_transaction(&self, mode: TxnMode) -> LmdbResult<Transaction<'_>> {
        let token = match mode {
            TxnMode::ReadOnly => None,
            TxnMode::ReadWrite if self.is_read_only() => return Err(LmdbError::ReadOnlyViolation),
            TxnMode::ReadWrite => Some(self.writer.acquire(self.writer_policy)?),
        };
        Transaction::begin(self, mode, token)
    }

    /// Create a read-only transaction for use with the environment.
    pub fn begin_ro_txn(&self) -> LmdbResult<Transaction<'_>> {
        self.new_transaction(TxnMode::ReadOnly)
    }

    /// Create a read-write transaction for use with the environment.
    pub fn begin_rw_txn(&self) -> LmdbResult<Transaction<'_>> {
        self.new_transaction(TxnMode::ReadWrite)
    }

    /// Flush the environment data buffers to disk.
    ///
    /// With `force`, the flush is synchronous even when the environment was
    /// opened with [`SyncMode::NoSync`] or [`SyncMode::NoMetaSync`].
    ///
    /// [`SyncMode::NoSync`]: crate::SyncMode::NoSync
    /// [`SyncMode::NoMetaSync`]: crate::SyncMode::NoMetaSync
    pub fn sync(&self, force: bool) -> LmdbResult<()> {
        lmdb_result(unsafe { ffi::mdb_env_sync(self.env_ptr(), force.into()) })
    }

    /// Retrieves statistics about the main database.
    pub fn stat(&self) -> LmdbResult<Stat> {
        unsafe {
            let mut stat = Stat::new();
            lmdb_result(ffi::mdb_env_stat(self.env_ptr(), stat.mdb_stat()))?;
            Ok(stat)
        }
    }

    /// Retrieves info about this environment.
    pub fn info(&self) -> LmdbResult<Info> {
        unsafe {
            let mut info = Info(std::mem::zeroed());
            lmdb_result(ffi::mdb_env_info(self.env_ptr(), &mut info.0))?;
            Ok(info)
        }
    }

    /// Largest key size, in bytes, the engine accepts.
    pub fn max_key_size(&self) -> usize {
        unsafe { ffi::mdb_env_get_maxkeysize(self.env_ptr()) as usize }
    }

    /// Number of databases currently registered with the environment.
    pub fn open_databases(&self) -> usize {
        self.dbs.lock().len()
    }

    /// Whether a read-write transaction is currently active.
    pub fn has_active_writer(&self) -> bool {
        self.writer.is_held()
    }

    /// Closes the environment.
    ///
    /// Fails with [`LmdbError::DatabasesStillOpen`] if any [`Database`] has
    /// not been closed. The engine instance is released either way.
    ///
    /// [`Database`]: crate::Database
    pub fn close(self) -> LmdbResult<()> {
        let open = self.open_databases();
        drop(self);
        if open > 0 {
            return Err(LmdbError::DatabasesStillOpen(open));
        }
        Ok(())
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, DbRegistry> {
        self.dbs.lock()
    }

    pub(crate) fn next_serial(&self) -> u64 {
        self.serials.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let open = self.dbs.get_mut().len();
        if open > 0 {
            error!(
                target: "signet_lmdb",
                path = %self.path().display(),
                open,
                "environment dropped with open database handles"
            );
        }
        // SAFETY: no transaction can outlive the borrow of self.
        unsafe { ffi::mdb_env_close(self.env.0) };
        debug!(target: "signet_lmdb", path = %self.path().display(), "environment closed");
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Environment statistics.
///
/// Contains information about the size and layout of an environment or
/// database.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Stat(ffi::MDB_stat);

impl Stat {
    /// Create a new Stat with zero'd inner struct `ffi::MDB_stat`.
    pub(crate) const fn new() -> Self {
        unsafe { Self(std::mem::zeroed()) }
    }

    /// Returns a mut pointer to `ffi::MDB_stat`.
    pub(crate) const fn mdb_stat(&mut self) -> *mut ffi::MDB_stat {
        &mut self.0
    }

    /// Size of a database page. This is the same for all databases in the
    /// environment.
    #[inline]
    pub const fn page_size(&self) -> u32 {
        self.0.ms_psize as u32
    }

    /// Depth (height) of the B-tree.
    #[inline]
    pub const fn depth(&self) -> u32 {
        self.0.ms_depth as u32
    }

    /// Number of internal (non-leaf) pages.
    #[inline]
    pub const fn branch_pages(&self) -> usize {
        self.0.ms_branch_pages
    }

    /// Number of leaf pages.
    #[inline]
    pub const fn leaf_pages(&self) -> usize {
        self.0.ms_leaf_pages
    }

    /// Number of overflow pages.
    #[inline]
    pub const fn overflow_pages(&self) -> usize {
        self.0.ms_overflow_pages
    }

    /// Number of data items.
    #[inline]
    pub const fn entries(&self) -> usize {
        self.0.ms_entries
    }
}

impl fmt::Debug for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stat")
            .field("page_size", &self.page_size())
            .field("depth", &self.depth())
            .field("branch_pages", &self.branch_pages())
            .field("leaf_pages", &self.leaf_pages())
            .field("overflow_pages", &self.overflow_pages())
            .field("entries", &self.entries())
            .finish()
    }
}

/// Environment information.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Info(ffi::MDB_envinfo);

impl Info {
    /// Size of the memory map, in bytes.
    #[inline]
    pub const fn map_size(&self) -> usize {
        self.0.me_mapsize
    }

    /// ID of the last used page.
    #[inline]
    pub const fn last_pgno(&self) -> usize {
        self.0.me_last_pgno
    }

    /// ID of the last committed transaction.
    #[inline]
    pub const fn last_txnid(&self) -> usize {
        self.0.me_last_txnid
    }

    /// Maximum number of reader slots.
    #[inline]
    pub const fn max_readers(&self) -> usize {
        self.0.me_maxreaders as usize
    }

    /// Number of reader slots in use.
    #[inline]
    pub const fn num_readers(&self) -> usize {
        self.0.me_numreaders as usize
    }
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("map_size", &self.map_size())
            .field("last_pgno", &self.last_pgno())
            .field("last_txnid", &self.last_txnid())
            .field("max_readers", &self.max_readers())
            .field("num_readers", &self.num_readers())
            .finish()
    }
}

/// Options for opening or creating an environment.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    flags: EnvironmentFlags,
    map_size: usize,
    max_readers: u32,
    max_dbs: u32,
    file_mode: u32,
    writer_policy: WriterPolicy,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            flags: EnvironmentFlags::default(),
            map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
            max_dbs: 0,
            file_mode: 0o644,
            writer_policy: WriterPolicy::default(),
        }
    }
}

impl EnvironmentBuilder {
    /// Open an environment.
    ///
    /// Unless [`EnvironmentFlags::no_sub_dir`] is set, `path` names a
    /// directory, which is created if it does not exist and the environment
    /// is writable.
    pub fn open(&self, path: impl AsRef<Path>) -> LmdbResult<Environment> {
        let path = path.as_ref();
        let fail = |reason| LmdbError::StorageOpen { path: path.to_path_buf(), reason };

        if self.map_size < MIN_MAP_SIZE {
            return Err(fail(OpenFailure::MapSizeTooSmall {
                requested: self.map_size,
                minimum: MIN_MAP_SIZE,
            }));
        }

        let canonical = self.prepare_path(path).map_err(|e| fail(io_failure(&e)))?;
        let lease = PathLease::acquire(canonical).ok_or_else(|| fail(OpenFailure::PathInUse))?;
        let c_path = path_to_cstring(lease.path()).map_err(fail)?;

        let mut env: *mut ffi::MDB_env = ptr::null_mut();
        unsafe {
            lmdb_result(ffi::mdb_env_create(&mut env))
                .map_err(|e| fail(engine_failure(&e)))?;

            let configured = (|| {
                lmdb_result(ffi::mdb_env_set_mapsize(env, self.map_size))?;
                lmdb_result(ffi::mdb_env_set_maxreaders(env, self.max_readers as c_uint))?;
                lmdb_result(ffi::mdb_env_set_maxdbs(env, self.max_dbs as ffi::MDB_dbi))?;
                lmdb_result(ffi::mdb_env_open(
                    env,
                    c_path.as_ptr(),
                    self.flags.make_flags(),
                    self.file_mode as ffi::mdb_mode_t,
                ))
            })();

            if let Err(e) = configured {
                ffi::mdb_env_close(env);
                return Err(fail(engine_failure(&e)));
            }
        }

        let env = Environment {
            env: EnvPtr(env),
            id: NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed),
            flags: self.flags,
            writer_policy: self.writer_policy,
            writer: WriterGate::default(),
            dbs: Mutex::new(DbRegistry::default()),
            serials: AtomicU64::new(1),
            lease,
        };

        debug!(
            target: "signet_lmdb",
            path = %env.path().display(),
            map_size = self.map_size,
            max_readers = self.max_readers,
            max_dbs = self.max_dbs,
            read_only = env.is_read_only(),
            "environment opened"
        );
        Ok(env)
    }

    /// Resolves `path` to its canonical form, creating the directory first
    /// when the environment is writable.
    fn prepare_path(&self, path: &Path) -> io::Result<PathBuf> {
        if self.flags.no_sub_dir {
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
                _ => std::env::current_dir()?,
            };
            let file = path.file_name().ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
            return Ok(parent.join(file));
        }
        if !self.flags.is_read_only() {
            std::fs::create_dir_all(path)?;
        }
        path.canonicalize()
    }

    /// Sets the provided options in the environment.
    pub const fn set_flags(&mut self, flags: EnvironmentFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Sets the access mode, keeping the other flags.
    pub const fn set_mode(&mut self, mode: Mode) -> &mut Self {
        self.flags.mode = mode;
        self
    }

    /// Sets the size of the memory map, in bytes.
    ///
    /// This is the upper bound on the size of the data file.
    pub const fn set_map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    /// Sets the maximum number of threads or reader slots for the
    /// environment.
    ///
    /// This defines the number of slots in the lock table that is used to
    /// track readers in the environment. The default is 126.
    pub const fn set_max_readers(&mut self, max_readers: u32) -> &mut Self {
        self.max_readers = max_readers;
        self
    }

    /// Sets the maximum number of named databases for the environment.
    ///
    /// This function is only needed if multiple databases will be used in the
    /// environment. Simpler applications that use the environment as a single
    /// unnamed database can ignore this option.
    ///
    /// Currently a moderate number of slots are cheap but a huge number gets
    /// expensive: 7-120 words per transaction, and every
    /// [`Database::init`] does a linear search of the opened slots.
    ///
    /// [`Database::init`]: crate::Database::init
    pub const fn set_max_dbs(&mut self, max_dbs: u32) -> &mut Self {
        self.max_dbs = max_dbs;
        self
    }

    /// Sets the UNIX permissions used when creating the data files.
    pub const fn set_file_mode(&mut self, file_mode: u32) -> &mut Self {
        self.file_mode = file_mode;
        self
    }

    /// Sets what a second read-write transaction does while one is active.
    pub const fn set_writer_policy(&mut self, writer_policy: WriterPolicy) -> &mut Self {
        self.writer_policy = writer_policy;
        self
    }
}

fn io_failure(err: &io::Error) -> OpenFailure {
    OpenFailure::Inaccessible(err.raw_os_error().unwrap_or(EINVAL))
}

fn engine_failure(err: &LmdbError) -> OpenFailure {
    OpenFailure::Engine(err.to_err_code().unwrap_or(EINVAL))
}

/// `EINVAL`, reported when a path cannot be expressed to the engine.
const EINVAL: i32 = 22;

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> Result<CString, OpenFailure> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).map_err(|_| OpenFailure::Inaccessible(EINVAL))
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> Result<CString, OpenFailure> {
    let path = path.to_str().ok_or(OpenFailure::Inaccessible(EINVAL))?;
    CString::new(path).map_err(|_| OpenFailure::Inaccessible(EINVAL))
}
