//! Workload driver for measuring the crate against a real store.
//!
//! Every workload uses the main database with keys `"0"` to `"n-1"`, each
//! stored with a value equal to its key. Read workloads populate an empty
//! store first and verify every value they read.

use crate::{Database, Environment, LmdbError, LmdbResult, OverwritePolicy, Transaction};
use rand::Rng;
use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument};

/// A benchmark workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workload {
    /// Insert every record in one read-write transaction.
    Write,
    /// Scan every record from the first key.
    Iterate,
    /// Point reads of random keys.
    RandomRead,
    /// Point reads of random keys, split across threads.
    ParallelRandomRead,
    /// Range seeks to random decimal prefixes, scanning each prefix.
    PrefixSeek,
}

impl Workload {
    /// Every workload, in the order they are usually run.
    pub const ALL: [Self; 5] =
        [Self::Write, Self::Iterate, Self::RandomRead, Self::ParallelRandomRead, Self::PrefixSeek];

    /// The workload's selector name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Iterate => "iterate",
            Self::RandomRead => "random_read",
            Self::ParallelRandomRead => "parallel_random_read",
            Self::PrefixSeek => "prefix_seek",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown workload selector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown workload {0:?}, expected one of write, iterate, random_read, parallel_random_read, prefix_seek")]
pub struct UnknownWorkload(pub String);

impl FromStr for Workload {
    type Err = UnknownWorkload;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| UnknownWorkload(s.to_owned()))
    }
}

/// Parameters for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Workload to run.
    pub workload: Workload,
    /// Environment directory.
    pub path: PathBuf,
    /// Number of records in the store.
    pub records: u32,
    /// Number of reads or seeks for read workloads.
    pub reads: u32,
    /// Environment map size, in bytes.
    pub map_size: usize,
    /// Threads for [`Workload::ParallelRandomRead`].
    pub threads: usize,
}

impl BenchConfig {
    /// A configuration with 100 000 records and reads, a 1 GiB map, and one
    /// thread per available core.
    pub fn new(workload: Workload, path: impl Into<PathBuf>) -> Self {
        Self {
            workload,
            path: path.into(),
            records: 100_000,
            reads: 100_000,
            map_size: 1 << 30,
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Outcome of one benchmark run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchReport {
    /// Workload that ran.
    pub workload: Workload,
    /// Records written, visited, or looked up.
    pub operations: u64,
    /// Operations that did not find the expected value, or writes refused
    /// because the key already existed.
    pub misses: u64,
    /// Wall time of the measured section.
    pub elapsed: Duration,
}

impl BenchReport {
    /// Operations per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 { 0.0 } else { self.operations as f64 / secs }
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ops in {:.3?} ({:.0} ops/s, {} misses)",
            self.workload,
            self.operations,
            self.elapsed,
            self.throughput(),
            self.misses
        )
    }
}

/// Runs one workload against the environment at `config.path`.
#[instrument(skip_all, fields(workload = %config.workload, path = %config.path.display()))]
pub fn run(config: &BenchConfig) -> LmdbResult<BenchReport> {
    let mut env = Environment::builder().set_map_size(config.map_size).open(&config.path)?;

    let db = {
        let txn = env.begin_rw_txn()?;
        let db = Database::init(&txn, None, true)?;
        txn.commit()?;
        db
    };

    if config.workload != Workload::Write && is_empty(&env, db)? {
        debug!(target: "signet_lmdb", records = config.records, "populating empty store");
        write(&env, db, config.records)?;
    }

    let start = Instant::now();
    let (operations, misses) = match config.workload {
        Workload::Write => write(&env, db, config.records)?,
        Workload::Iterate => iterate(&env, db)?,
        Workload::RandomRead => random_read(&env.begin_ro_txn()?, db, config.records, config.reads)?,
        Workload::ParallelRandomRead => {
            parallel_random_read(&env, db, config.records, config.reads, config.threads)?
        }
        Workload::PrefixSeek => prefix_seek(&env, db, config.records, config.reads)?,
    };
    let report = BenchReport { workload: config.workload, operations, misses, elapsed: start.elapsed() };

    db.close(&mut env)?;
    env.close()?;

    info!(target: "signet_lmdb", %report, "workload finished");
    Ok(report)
}

fn is_empty(env: &Environment, db: Database) -> LmdbResult<bool> {
    let txn = env.begin_ro_txn()?;
    Ok(db.stat(&txn)?.entries() == 0)
}

/// Writes keys `0..records`. Existing keys count as misses.
fn write(env: &Environment, db: Database, records: u32) -> LmdbResult<(u64, u64)> {
    let mut txn = env.begin_rw_txn()?;
    let mut misses = 0;
    for n in 0..records {
        let key = n.to_string();
        match db.write(&mut txn, &key, &key, OverwritePolicy::NoOverwrite) {
            Ok(()) => {}
            Err(LmdbError::KeyExists) => misses += 1,
            Err(err) => return Err(err),
        }
    }
    txn.commit()?;
    Ok((records.into(), misses))
}

fn iterate(env: &Environment, db: Database) -> LmdbResult<(u64, u64)> {
    let txn = env.begin_ro_txn()?;
    let mut cursor = db.new_cursor(&txn)?;
    let (mut operations, mut misses) = (0, 0);

    let mut found = cursor.seek_first()?;
    while found {
        operations += 1;
        if cursor.key()? != cursor.value()? {
            misses += 1;
        }
        found = cursor.next()?;
    }
    Ok((operations, misses))
}

fn random_read(txn: &Transaction<'_>, db: Database, records: u32, reads: u32) -> LmdbResult<(u64, u64)> {
    let mut rng = rand::rng();
    let mut misses = 0;
    for _ in 0..reads {
        let key = rng.random_range(0..records.max(1)).to_string();
        match db.get(txn, &key)? {
            Some(value) if value == key.as_str() => {}
            _ => misses += 1,
        }
    }
    Ok((reads.into(), misses))
}

fn parallel_random_read(
    env: &Environment,
    db: Database,
    records: u32,
    reads: u32,
    threads: usize,
) -> LmdbResult<(u64, u64)> {
    let threads = u32::try_from(threads.max(1)).unwrap_or(u32::MAX).min(reads.max(1));
    let share = reads / threads;
    let extra = reads % threads;

    thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let reads = share + u32::from(i < extra);
                s.spawn(move || random_read(&env.begin_ro_txn()?, db, records, reads))
            })
            .collect();

        handles.into_iter().try_fold((0, 0), |(ops, misses), handle| {
            let (o, m) = handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
            Ok::<_, LmdbError>((ops + o, misses + m))
        })
    })
}

fn prefix_seek(env: &Environment, db: Database, records: u32, seeks: u32) -> LmdbResult<(u64, u64)> {
    let txn = env.begin_ro_txn()?;
    let mut cursor = db.new_cursor(&txn)?;
    let mut rng = rand::rng();
    let mut misses = 0;

    for _ in 0..seeks {
        let prefix = rng.random_range(0..records.max(1)).to_string();
        let mut matched = 0u64;
        let mut found = cursor.seek_to(&prefix)?;
        while found && cursor.key()?.starts_with(&prefix) {
            matched += 1;
            found = cursor.next()?;
        }
        if matched == 0 {
            misses += 1;
        }
    }
    Ok((seeks.into(), misses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(workload: Workload, path: &std::path::Path) -> BenchConfig {
        BenchConfig { records: 500, reads: 200, map_size: 8 << 20, threads: 3, ..BenchConfig::new(workload, path) }
    }

    #[test]
    fn workload_names_round_trip() {
        for w in Workload::ALL {
            assert_eq!(w.as_str().parse::<Workload>(), Ok(w));
        }
        assert!("scan".parse::<Workload>().is_err());
    }

    #[test]
    fn every_workload_runs_clean() {
        let dir = tempdir().unwrap();
        for workload in Workload::ALL {
            let report = run(&config(workload, dir.path())).unwrap();
            assert_eq!(report.workload, workload);
            assert_eq!(report.misses, 0, "{report}");
        }
    }

    #[test]
    fn read_workloads_populate_empty_store() {
        let dir = tempdir().unwrap();
        let report = run(&config(Workload::Iterate, dir.path())).unwrap();
        assert_eq!(report.operations, 500);

        let rewrite = run(&config(Workload::Write, dir.path())).unwrap();
        assert_eq!(rewrite.misses, 500, "existing keys are refused");
    }
}
