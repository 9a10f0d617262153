//! Borrowed views over keys and values.

use std::{fmt, ops::Deref, ptr, slice};

/// An immutable, non-owning view over a contiguous byte range.
///
/// Spans handed out by a [`Transaction`] or [`Cursor`] borrow from that
/// handle, so the borrow checker rejects any use after the next write,
/// repositioning call, commit, or abort.
///
/// Equality and ordering are byte-wise.
///
/// [`Transaction`]: crate::Transaction
/// [`Cursor`]: crate::Cursor
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSpan<'a>(&'a [u8]);

impl<'a> ByteSpan<'a> {
    /// Creates a span over the given bytes.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self(data)
    }

    /// Creates a span over an engine value.
    ///
    /// # Safety
    ///
    /// `val` must describe memory that stays valid and unmodified for `'a`.
    #[inline]
    pub(crate) const unsafe fn from_val(val: &ffi::MDB_val) -> Self {
        if val.mv_size == 0 || val.mv_data.is_null() {
            return Self(&[]);
        }
        // SAFETY: caller guarantees validity for 'a.
        Self(unsafe { slice::from_raw_parts(val.mv_data as *const u8, val.mv_size) })
    }

    /// Number of bytes in the span.
    #[inline]
    pub const fn size(&self) -> usize {
        self.0.len()
    }

    /// Whether the span has no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The viewed bytes.
    #[inline]
    pub const fn data(&self) -> &'a [u8] {
        self.0
    }

    /// Whether the span begins with `prefix`.
    #[inline]
    pub fn starts_with(&self, prefix: impl AsRef<[u8]>) -> bool {
        self.0.starts_with(prefix.as_ref())
    }

    /// Whether the span ends with `suffix`.
    #[inline]
    pub fn ends_with(&self, suffix: impl AsRef<[u8]>) -> bool {
        self.0.ends_with(suffix.as_ref())
    }

    /// Copies the bytes into an owned buffer.
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Whether two spans view the same memory, not merely equal bytes.
    #[inline]
    pub fn same_memory(&self, other: &ByteSpan<'_>) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Deref for ByteSpan<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.0
    }
}

impl AsRef<[u8]> for ByteSpan<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

impl<'a> From<&'a [u8]> for ByteSpan<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self(data)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ByteSpan<'a> {
    fn from(data: &'a [u8; N]) -> Self {
        Self(data.as_slice())
    }
}

impl<'a> From<&'a str> for ByteSpan<'a> {
    fn from(data: &'a str) -> Self {
        Self(data.as_bytes())
    }
}

impl<'a> From<&'a String> for ByteSpan<'a> {
    fn from(data: &'a String) -> Self {
        Self(data.as_bytes())
    }
}

impl<'a> From<&'a Vec<u8>> for ByteSpan<'a> {
    fn from(data: &'a Vec<u8>) -> Self {
        Self(data.as_slice())
    }
}

impl PartialEq<[u8]> for ByteSpan<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl PartialEq<&[u8]> for ByteSpan<'_> {
    fn eq(&self, other: &&[u8]) -> bool {
        self.0 == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for ByteSpan<'_> {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other.as_slice()
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for ByteSpan<'_> {
    fn eq(&self, other: &&[u8; N]) -> bool {
        self.0 == other.as_slice()
    }
}

impl PartialEq<&str> for ByteSpan<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl fmt::Debug for ByteSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.0.escape_ascii())
    }
}
