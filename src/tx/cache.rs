//! Registries for [`Database`] handles.
//!
//! [`DbRegistry`] is owned by the [`Environment`] and records every handle
//! the engine has open, along with which transactions may use it.
//! [`TxCache`] remembers the handles one [`Transaction`] has already
//! validated, so repeated calls skip the environment lock.
//!
//! [`Environment`]: crate::Environment
//! [`Transaction`]: crate::Transaction

use crate::{Database, LmdbError, LmdbResult};
use smallvec::SmallVec;
use std::cell::RefCell;

/// Identity of a transaction as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TxnStamp {
    /// Environment-unique transaction serial.
    pub(crate) serial: u64,
    /// Registry epoch observed before the engine transaction began.
    pub(crate) epoch: u64,
}

/// Who may use a registered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    /// Opened by the transaction with this serial, which has not ended.
    Pending(u64),
    /// Shared with every transaction that began at or after this epoch.
    Published(u64),
}

impl Visibility {
    /// Whether a transaction with `stamp` may use the handle.
    ///
    /// `Err` means the handle exists but is not usable by this transaction
    /// yet.
    const fn check(self, stamp: TxnStamp) -> LmdbResult<()> {
        match self {
            Self::Pending(serial) if serial == stamp.serial => Ok(()),
            Self::Published(epoch) if epoch <= stamp.epoch => Ok(()),
            _ => Err(LmdbError::DatabaseInitBusy),
        }
    }
}

#[derive(Debug)]
struct RegisteredDb {
    name: Option<Box<str>>,
    db: Database,
    visibility: Visibility,
}

/// Environment-wide table of open database handles.
///
/// Uses inline storage for the common case (most apps use < 16 databases).
#[derive(Debug, Default)]
pub(crate) struct DbRegistry {
    entries: SmallVec<[RegisteredDb; 16]>,
    next_generation: u64,
    /// Bumped each time a transaction publishes handles.
    epoch: u64,
    /// Serial of the transaction holding unpublished opens.
    opener: Option<u64>,
}

impl DbRegistry {
    /// Current publication epoch.
    pub(crate) const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of registered handles, published or not.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Finds the handle registered under `name` for a transaction.
    ///
    /// Returns `Ok(None)` when the transaction may open the name itself.
    /// Fails with [`LmdbError::DatabaseInitBusy`] when the handle belongs to
    /// another transaction, was published after this one began, or when
    /// another transaction holds unpublished opens.
    pub(crate) fn lookup(&self, name: Option<&str>, stamp: TxnStamp) -> LmdbResult<Option<Database>> {
        if let Some(entry) = self.entries.iter().find(|e| e.name.as_deref() == name) {
            entry.visibility.check(stamp)?;
            return Ok(Some(entry.db));
        }
        match self.opener {
            Some(serial) if serial != stamp.serial => Err(LmdbError::DatabaseInitBusy),
            _ => Ok(None),
        }
    }

    /// Records a handle the engine just opened inside the transaction
    /// `serial`. It stays private to that transaction until [`Self::finish`].
    pub(crate) fn register(
        &mut self,
        name: Option<&str>,
        dbi: ffi::MDB_dbi,
        flags: crate::DatabaseFlags,
        env_id: u64,
        serial: u64,
    ) -> Database {
        let generation = self.next_generation;
        self.next_generation += 1;

        let db = Database::new(dbi, flags, env_id, generation);
        self.entries.push(RegisteredDb {
            name: name.map(Into::into),
            db,
            visibility: Visibility::Pending(serial),
        });
        self.opener = Some(serial);
        db
    }

    /// Checks that `db` is registered and usable by the transaction.
    pub(crate) fn check(&self, db: &Database, stamp: TxnStamp) -> LmdbResult<()> {
        self.entries
            .iter()
            .find(|e| e.db == *db)
            .ok_or(LmdbError::StaleDatabase)?
            .visibility
            .check(stamp)
    }

    /// Name a handle was registered under.
    pub(crate) fn name_of(&self, db: &Database) -> LmdbResult<Option<String>> {
        self.entries
            .iter()
            .find(|e| e.db == *db)
            .map(|e| e.name.as_deref().map(str::to_owned))
            .ok_or(LmdbError::StaleDatabase)
    }

    /// Publishes or discards the handles opened by transaction `serial`.
    ///
    /// The engine closes handles opened in a transaction that aborts, so
    /// discarding them here keeps both tables in step.
    pub(crate) fn finish(&mut self, serial: u64, committed: bool) {
        if self.opener != Some(serial) {
            return;
        }
        self.opener = None;

        let pending = Visibility::Pending(serial);
        if committed {
            self.epoch += 1;
            let published = Visibility::Published(self.epoch);
            for entry in self.entries.iter_mut().filter(|e| e.visibility == pending) {
                entry.visibility = published;
            }
        } else {
            self.entries.retain(|e| e.visibility != pending);
        }
    }

    /// Unregisters a published handle. Returns false if it was not
    /// registered.
    pub(crate) fn remove(&mut self, db: &Database) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !(e.db == *db && matches!(e.visibility, Visibility::Published(_))));
        self.entries.len() != before
    }
}

/// Handles already validated by one transaction.
///
/// A validated handle cannot become stale while the transaction lives:
/// closing a handle needs exclusive access to the environment.
#[derive(Debug, Default)]
pub(crate) struct TxCache(RefCell<SmallVec<[Database; 8]>>);

impl TxCache {
    pub(crate) fn contains(&self, db: &Database) -> bool {
        self.0.borrow().contains(db)
    }

    pub(crate) fn insert(&self, db: Database) {
        let mut cache = self.0.borrow_mut();
        if !cache.contains(&db) {
            cache.push(db);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseFlags;

    const ENV: u64 = 7;

    fn stamp(serial: u64, epoch: u64) -> TxnStamp {
        TxnStamp { serial, epoch }
    }

    #[test]
    fn pending_handles_are_private() {
        let mut reg = DbRegistry::default();
        let db = reg.register(Some("users"), 2, DatabaseFlags::empty(), ENV, 1);

        assert_eq!(reg.lookup(Some("users"), stamp(1, 0)), Ok(Some(db)));
        assert_eq!(reg.lookup(Some("users"), stamp(2, 0)), Err(LmdbError::DatabaseInitBusy));
        assert_eq!(reg.lookup(Some("other"), stamp(2, 0)), Err(LmdbError::DatabaseInitBusy));
        assert_eq!(reg.lookup(Some("other"), stamp(1, 0)), Ok(None));
        assert_eq!(reg.check(&db, stamp(2, 0)), Err(LmdbError::DatabaseInitBusy));
    }

    #[test]
    fn commit_publishes_for_later_transactions() {
        let mut reg = DbRegistry::default();
        let db = reg.register(Some("users"), 2, DatabaseFlags::empty(), ENV, 1);
        let before = reg.epoch();
        reg.finish(1, true);

        assert_eq!(reg.check(&db, stamp(2, before)), Err(LmdbError::DatabaseInitBusy));
        assert_eq!(reg.check(&db, stamp(3, reg.epoch())), Ok(()));
        assert_eq!(reg.lookup(Some("other"), stamp(3, reg.epoch())), Ok(None));
        assert_eq!(reg.name_of(&db), Ok(Some("users".to_owned())));
    }

    #[test]
    fn abort_discards_pending() {
        let mut reg = DbRegistry::default();
        let db = reg.register(None, 1, DatabaseFlags::DUP_SORT, ENV, 1);
        reg.finish(1, false);

        assert_eq!(reg.len(), 0);
        assert_eq!(reg.check(&db, stamp(2, reg.epoch())), Err(LmdbError::StaleDatabase));
        assert_eq!(reg.lookup(None, stamp(2, reg.epoch())), Ok(None));
    }

    #[test]
    fn remove_once() {
        let mut reg = DbRegistry::default();
        let db = reg.register(Some("a"), 2, DatabaseFlags::empty(), ENV, 1);
        assert!(!reg.remove(&db), "pending handles are not closable");
        reg.finish(1, true);
        assert!(reg.remove(&db));
        assert!(!reg.remove(&db));

        let reopened = reg.register(Some("a"), 2, DatabaseFlags::empty(), ENV, 4);
        assert_ne!(reopened, db, "generation distinguishes reused slots");
    }
}
