//! Raw engine operations on transaction pointers.
//!
//! Every function here is `unsafe`: the caller guarantees that `txn` is a
//! live transaction, that `dbi` was opened in or before it, and, for the
//! write operations, that `txn` is read-write.

use crate::{
    ByteSpan, LmdbResult, Stat,
    error::{LmdbError, lmdb_result},
};
use std::{
    ffi::{CStr, c_uint, c_void},
    ptr,
};

/// Wraps a byte slice as an engine value without copying.
#[inline(always)]
pub(crate) const fn slice_to_val(data: &[u8]) -> ffi::MDB_val {
    ffi::MDB_val { mv_size: data.len(), mv_data: data.as_ptr() as *mut c_void }
}

/// An empty engine value for the engine to fill in.
#[inline(always)]
pub(crate) const fn empty_val() -> ffi::MDB_val {
    ffi::MDB_val { mv_size: 0, mv_data: ptr::null_mut() }
}

/// Opens a database handle.
pub(crate) unsafe fn dbi_open_raw(
    txn: *mut ffi::MDB_txn,
    name: Option<&CStr>,
    flags: c_uint,
) -> LmdbResult<ffi::MDB_dbi> {
    let name_ptr = name.map_or(ptr::null(), CStr::as_ptr);
    let mut dbi: ffi::MDB_dbi = 0;
    lmdb_result(unsafe { ffi::mdb_dbi_open(txn, name_ptr, flags, &mut dbi) })?;
    Ok(dbi)
}

/// Reads the persistent flags of an open database.
pub(crate) unsafe fn dbi_flags_raw(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
) -> LmdbResult<c_uint> {
    let mut flags: c_uint = 0;
    lmdb_result(unsafe { ffi::mdb_dbi_flags(txn, dbi, &mut flags) })?;
    Ok(flags)
}

/// Point lookup. The returned span borrows engine memory for `'a`.
///
/// The engine rejects empty keys, and none can be stored, so an empty key
/// is simply absent.
pub(crate) unsafe fn get_raw<'a>(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    key: &[u8],
) -> LmdbResult<Option<ByteSpan<'a>>> {
    if key.is_empty() {
        return Ok(None);
    }
    let mut key_val = slice_to_val(key);
    let mut data_val = empty_val();

    match unsafe { ffi::mdb_get(txn, dbi, &mut key_val, &mut data_val) } {
        ffi::MDB_SUCCESS => Ok(Some(unsafe { ByteSpan::from_val(&data_val) })),
        ffi::MDB_NOTFOUND => Ok(None),
        err_code => Err(LmdbError::from_err_code(err_code)),
    }
}

/// Stores a key/value pair.
pub(crate) unsafe fn put_raw(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    key: &[u8],
    data: &[u8],
    flags: c_uint,
) -> LmdbResult<()> {
    let mut key_val = slice_to_val(key);
    let mut data_val = slice_to_val(data);
    lmdb_result(unsafe { ffi::mdb_put(txn, dbi, &mut key_val, &mut data_val, flags) })
}

/// Deletes a key, or with `data`, one duplicate of it.
pub(crate) unsafe fn del_raw(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    key: &[u8],
    data: Option<&[u8]>,
) -> LmdbResult<()> {
    if key.is_empty() {
        return Err(LmdbError::KeyNotFound);
    }
    let mut key_val = slice_to_val(key);
    let mut data_val = data.map(slice_to_val);
    let data_ptr = data_val.as_mut().map_or(ptr::null_mut(), |v| v as *mut ffi::MDB_val);
    lmdb_result(unsafe { ffi::mdb_del(txn, dbi, &mut key_val, data_ptr) })
}

/// Removes every item from a database, keeping the handle open.
pub(crate) unsafe fn clear_raw(txn: *mut ffi::MDB_txn, dbi: ffi::MDB_dbi) -> LmdbResult<()> {
    lmdb_result(unsafe { ffi::mdb_drop(txn, dbi, 0) })
}

/// Database statistics.
pub(crate) unsafe fn stat_raw(txn: *mut ffi::MDB_txn, dbi: ffi::MDB_dbi) -> LmdbResult<Stat> {
    let mut stat = Stat::new();
    lmdb_result(unsafe { ffi::mdb_stat(txn, dbi, stat.mdb_stat()) })?;
    Ok(stat)
}
