//! Idiomatic and safe Rust bindings for [LMDB].
//!
//! # Overview
//!
//! [LMDB] is an embedded, memory-mapped, ordered key-value store with a
//! single writer and many concurrent readers, each reader pinned to a
//! consistent snapshot.
//!
//! This crate provides a safe, idiomatic Rust interface for:
//! - Creating and managing memory-mapped database environments
//! - Performing transactional read and write operations
//! - Navigating ordered keys and duplicate values with cursors
//! - Measuring common workloads with the [`harness`] module
//!
//! # Quick Start
//!
//! Databases are stored in a directory on disk. The following example
//! demonstrates creating an environment, writing a key-value pair, and
//! reading it back.
//!
//! ```no_run
//! use signet_lmdb::{Database, Environment, LmdbResult, OverwritePolicy};
//! use std::path::Path;
//!
//! fn main() -> LmdbResult<()> {
//!     // Open an environment (creates directory if needed)
//!     let mut env = Environment::builder()
//!         .set_map_size(1024 * 1024 * 1024) // up to 1GB
//!         .open(Path::new("/tmp/my_database"))?;
//!
//!     // Write data in a read-write transaction
//!     let mut txn = env.begin_rw_txn()?;
//!     let db = Database::init(&txn, None, true)?;
//!     db.write(&mut txn, b"hello", b"world", OverwritePolicy::AllowOverwrite)?;
//!     txn.commit()?;
//!
//!     // Read data in a read-only transaction
//!     let txn = env.begin_ro_txn()?;
//!     let value = db.get(&txn, b"hello")?;
//!     assert_eq!(value.as_deref(), Some(b"world".as_slice()));
//!     drop(txn);
//!
//!     db.close(&mut env)?;
//!     env.close()
//! }
//! ```
//!
//! # Key Concepts
//!
//! - [`Environment`] - A directory containing one or more databases. Created
//!   via [`Environment::builder()`] or [`Environment::open`].
//! - [`Transaction`] - A [`TxnMode::ReadOnly`] snapshot or the single
//!   [`TxnMode::ReadWrite`] writer. Borrows its environment.
//! - [`Database`] - A named or unnamed keyspace within an environment.
//!   Resolved with [`Database::init`], closed with [`Database::close`].
//! - [`Cursor`] - Enables ordered positioning within a database. Created via
//!   [`Database::new_cursor`]. Borrows its transaction.
//! - [`ByteSpan`] - A borrowed view of a key or value. Spans returned by
//!   reads borrow the transaction or cursor that produced them.
//!
//! # Handle Lifetimes
//!
//! Release order is Cursor, then Transaction, then Database, then
//! Environment. The first two are enforced by the borrow checker. Database
//! handles are validated on every call, so a closed or foreign handle fails
//! with [`LmdbError::StaleDatabase`] rather than reaching the engine.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events under the `signet_lmdb` target. Every
//! transaction carries a `lmdb_txn` span.
//!
//! # Provenance
//!
//! Shaped after [signet-libmdbx], itself forked from [reth-libmdbx]. Original
//! LMDB bindings from [lmdb-rs].
//!
//! [LMDB]: https://www.symas.com/lmdb
//! [signet-libmdbx]: https://github.com/init4tech/mdbx
//! [reth-libmdbx]: https://github.com/paradigmxyz/reth
//! [lmdb-rs]: https://github.com/mozilla/lmdb-rs
//!
//! # Imports
//!
//! For most use cases, import from the crate root:
//! ```rust,ignore
//! use signet_lmdb::{Environment, Database, OverwritePolicy, LmdbResult};
//! ```
//!
//! For advanced usage, import from submodules:
//! - [`tx::iter`] - Owned iterators over cursor positions
//! - [`sys`] - Environment internals (`Stat`, `Info`, size constants)
//!

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub extern crate lmdb_sys as ffi;

// Used by the `lmdb-bench` binary only.
#[cfg(feature = "cli")]
use clap as _;
#[cfg(feature = "cli")]
use tracing_subscriber as _;

mod error;
pub use error::{ErrorKind, LmdbError, LmdbResult, OpenFailure};

mod flags;
pub use flags::{
    DatabaseFlags, EnvironmentFlags, Mode, OverwritePolicy, SyncMode, TxnMode, WriterPolicy,
};

pub mod harness;

mod span;
pub use span::ByteSpan;

pub mod sys;
pub use sys::{Environment, EnvironmentBuilder, Info, Stat};

pub mod tx;
pub use tx::{Cursor, CursorOp, Database, Transaction};
