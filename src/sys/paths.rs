//! Process-wide registry of open environment paths.
//!
//! The engine must not have the same environment open twice in one process:
//! closing either copy releases the other's file locks.

use parking_lot::Mutex;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::LazyLock,
};

static OPEN_PATHS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(Default::default);

/// Exclusive claim on a canonical environment path. Released on drop.
#[derive(Debug)]
pub(crate) struct PathLease {
    path: PathBuf,
}

impl PathLease {
    /// Claims `path`, or returns `None` if another environment holds it.
    pub(crate) fn acquire(path: PathBuf) -> Option<Self> {
        let mut open = OPEN_PATHS.lock();
        if !open.insert(path.clone()) {
            return None;
        }
        Some(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLease {
    fn drop(&mut self) {
        OPEN_PATHS.lock().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let path = PathBuf::from("/nonexistent/signet-lmdb/lease-test");
        let lease = PathLease::acquire(path.clone()).unwrap();
        assert_eq!(lease.path(), path.as_path());
        assert!(PathLease::acquire(path.clone()).is_none());
        drop(lease);
        assert!(PathLease::acquire(path).is_some());
    }
}
