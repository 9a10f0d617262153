//! Owned iterators over cursor positions.
//!
//! Each item is copied out of the engine, so items may outlive the cursor
//! and the transaction. For zero-copy traversal, drive the [`Cursor`]
//! positioning methods and read [`Cursor::key`] and [`Cursor::value`]
//! directly.

use crate::{Cursor, CursorOp, LmdbResult};
use std::{fmt, mem};

/// Where an iterator starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Start {
    /// The first key.
    First,
    /// The smallest key greater than or equal to this one.
    Range(Vec<u8>),
    /// Exactly this key. Only its values are yielded.
    Exact(Vec<u8>),
}

/// How an iterator moves after its first item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    NextDup,
    /// A single item, for exact lookups without duplicates.
    Once,
}

/// State for an iterator.
#[derive(Debug)]
enum IterState {
    /// Not yet positioned.
    Init(Start),
    /// Iterator is active.
    Active,
    /// Iterator has reached the end.
    End,
}

/// An iterator over owned key/value pairs.
///
/// Created by [`Cursor::iter_start`], [`Cursor::iter_from`],
/// [`Cursor::iter_prefix`] and [`Cursor::iter_dup_of`]. The iterator drives
/// the cursor it borrows.
pub struct Iter<'cur, 'txn> {
    cursor: &'cur mut Cursor<'txn>,
    state: IterState,
    step: Step,
    /// Stop at the first key without this prefix.
    prefix: Option<Vec<u8>>,
}

impl fmt::Debug for Iter<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("state", &self.state).field("step", &self.step).finish()
    }
}

impl<'cur, 'txn> Iter<'cur, 'txn> {
    pub(crate) fn new(
        cursor: &'cur mut Cursor<'txn>,
        start: Start,
        prefix: Option<Vec<u8>>,
    ) -> Self {
        let step = match start {
            Start::Exact(_) if cursor.db().allows_duplicates() => Step::NextDup,
            Start::Exact(_) => Step::Once,
            Start::First | Start::Range(_) => Step::Next,
        };
        Self { cursor, state: IterState::Init(start), step, prefix }
    }

    /// Moves the cursor to the next item. Returns whether one was found.
    fn advance(&mut self) -> LmdbResult<bool> {
        match mem::replace(&mut self.state, IterState::Active) {
            IterState::Init(Start::First) => self.cursor.seek_first(),
            IterState::Init(Start::Range(key)) => self.cursor.seek_to(key),
            IterState::Init(Start::Exact(key)) => self.cursor.get(key),
            IterState::Active => match self.step {
                Step::Next => self.cursor.next(),
                Step::NextDup => self.cursor.position(CursorOp::NextDup),
                Step::Once => Ok(false),
            },
            IterState::End => Ok(false),
        }
    }
}

impl Iterator for Iter<'_, '_> {
    type Item = LmdbResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => {}
            Ok(false) => {
                self.state = IterState::End;
                return None;
            }
            Err(err) => {
                self.state = IterState::End;
                return Some(Err(err));
            }
        }

        let Some((key, value)) = self.cursor.current() else {
            self.state = IterState::End;
            return None;
        };
        if let Some(prefix) = &self.prefix
            && !key.starts_with(prefix)
        {
            self.state = IterState::End;
            return None;
        }
        Some(Ok((key.to_vec(), value.to_vec())))
    }
}
