//! Transaction management and access.
//!
//! # Core Types (re-exported at crate root)
//!
//! - [`Transaction`] - A read-only or read-write transaction
//! - [`Database`] - Handle to an opened database
//! - [`Cursor`] - Database cursor for navigating entries
//! - [`CursorOp`] - Cursor positioning operations
//!
//! Handles nest by borrowing: a [`Cursor`] borrows its [`Transaction`],
//! which borrows its [`Environment`]. A [`Database`] is a plain token,
//! validated against the environment on every use.
//!
//! [`Environment`]: crate::Environment

mod access;

pub(crate) mod cache;

mod cursor;
pub use cursor::{Cursor, CursorOp};

mod database;
pub use database::Database;

pub mod iter;

/// Raw operations on transactions.
pub(crate) mod ops;

mod transaction;
pub use transaction::Transaction;
