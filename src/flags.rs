use bitflags::bitflags;
use ffi::*;
use std::ffi::c_uint;

/// Durability mode of a writable environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Default robust and durable sync mode.
    ///
    /// Metadata is written and flushed to disk after data pages are written
    /// and flushed.
    #[default]
    Durable,

    /// Don't sync the meta-page after commit.
    ///
    /// A system crash may undo the last committed transaction, but the
    /// database stays consistent.
    NoMetaSync,

    /// Don't sync anything after commit.
    ///
    /// The last transactions may be lost on system crash. Use
    /// [`Environment::sync`] to force a flush.
    ///
    /// [`Environment::sync`]: crate::Environment::sync
    NoSync,
}

/// Access mode of an environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Open the environment read-only. Read-write transactions are refused.
    ReadOnly,
    /// Open the environment for reading and writing.
    ReadWrite {
        /// Durability of commits.
        sync_mode: SyncMode,
    },
}

impl Default for Mode {
    fn default() -> Self {
        Self::ReadWrite { sync_mode: SyncMode::default() }
    }
}

impl From<Mode> for EnvironmentFlags {
    fn from(mode: Mode) -> Self {
        Self { mode, ..Default::default() }
    }
}

/// Options used when opening an environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentFlags {
    /// The path is a file rather than a directory holding `data.mdb` and
    /// `lock.mdb`.
    pub no_sub_dir: bool,
    /// Map the data file at a fixed address.
    pub fixed_map: bool,
    /// Turn off OS read-ahead on the memory map.
    pub no_read_ahead: bool,
    /// Access mode.
    pub mode: Mode,
}

impl EnvironmentFlags {
    /// Configures the raw engine flags. Reader slots are never tied to
    /// threads.
    pub(crate) const fn make_flags(&self) -> c_uint {
        let mut flags: c_uint = MDB_NOTLS;

        if self.no_sub_dir {
            flags |= MDB_NOSUBDIR;
        }
        if self.fixed_map {
            flags |= MDB_FIXEDMAP;
        }
        if self.no_read_ahead {
            flags |= MDB_NORDAHEAD;
        }

        match self.mode {
            Mode::ReadOnly => flags |= MDB_RDONLY,
            Mode::ReadWrite { sync_mode } => match sync_mode {
                SyncMode::Durable => {}
                SyncMode::NoMetaSync => flags |= MDB_NOMETASYNC,
                SyncMode::NoSync => flags |= MDB_NOSYNC,
            },
        }

        flags
    }

    /// Whether the environment refuses writes.
    pub const fn is_read_only(&self) -> bool {
        matches!(self.mode, Mode::ReadOnly)
    }
}

bitflags! {
    /// Database options.
    ///
    /// Keys are always compared byte-wise, and so are duplicate values.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
    pub struct DatabaseFlags: c_uint {
        /// Allow multiple values per key, kept in byte-wise order.
        const DUP_SORT = MDB_DUPSORT;
        /// With [`DatabaseFlags::DUP_SORT`], all values of a key have the
        /// same size.
        const DUP_FIXED = MDB_DUPFIXED;
    }
}

impl DatabaseFlags {
    /// Whether multiple values may share one key.
    pub const fn allows_duplicates(&self) -> bool {
        self.contains(Self::DUP_SORT)
    }
}

/// What a write does when the key is already present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Replace the value. On a [`DatabaseFlags::DUP_SORT`] database the value
    /// is added as another duplicate instead.
    #[default]
    AllowOverwrite,
    /// Fail with [`LmdbError::KeyExists`] and leave the stored value alone.
    ///
    /// [`LmdbError::KeyExists`]: crate::LmdbError::KeyExists
    NoOverwrite,
}

impl OverwritePolicy {
    pub(crate) const fn make_flags(self) -> c_uint {
        match self {
            Self::AllowOverwrite => 0,
            Self::NoOverwrite => MDB_NOOVERWRITE,
        }
    }
}

/// Transaction mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxnMode {
    /// A read-write transaction. At most one is active per environment.
    ReadWrite,
    /// A read-only transaction pinned to the snapshot visible when it began.
    ReadOnly,
}

impl TxnMode {
    pub(crate) const fn make_flags(self) -> c_uint {
        match self {
            Self::ReadWrite => 0,
            Self::ReadOnly => MDB_RDONLY,
        }
    }

    /// Whether this is [`TxnMode::ReadOnly`].
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// What a read-write transaction does when another one is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriterPolicy {
    /// Wait until the active writer commits or aborts.
    #[default]
    Block,
    /// Fail immediately with [`LmdbError::WriterBusy`].
    ///
    /// [`LmdbError::WriterBusy`]: crate::LmdbError::WriterBusy
    FailFast,
}
