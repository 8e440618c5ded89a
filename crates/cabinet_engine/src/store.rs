//! Record storage shared by the hash and B-tree databases.

use crate::ecode::*;
use crate::file::{self, DbFile, FileKind};
use std::borrow::Cow;
use std::ffi::{c_int, CStr, CString};
use std::path::Path;

/// A key with its values, as written to a database file.
///
/// Hash records always carry exactly one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) key: Vec<u8>,
    pub(crate) vals: Vec<Vec<u8>>,
}

/// How a put treats an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PutMode {
    /// Overwrite the existing value.
    Over,
    /// Fail with `TCEKEEP` if the key exists.
    Keep,
    /// Append to the existing value.
    Cat,
    /// Add another value under the key.
    Dup,
}

/// A record set that can be persisted.
pub(crate) trait Records: Clone + Default {
    /// File kind used when writing the set.
    const KIND: FileKind;

    /// All records in file order.
    fn snapshot(&self) -> Cow<'_, [Record]>;

    /// Number of stored values.
    fn rnum(&self) -> u64;
}

/// Where an open database lives.
#[derive(Debug)]
pub(crate) enum Backing {
    /// On-memory database; nothing is written.
    Memory,
    /// File database.
    File { path: CString, file: DbFile },
}

/// An open database: its records, backing and transaction state.
#[derive(Debug)]
pub(crate) struct Opened<T> {
    pub(crate) backing: Backing,
    pub(crate) recs: T,
    pub(crate) opts: u8,
    txn: Option<T>,
}

impl<T: Records> Opened<T> {
    pub(crate) fn memory() -> Self {
        Self {
            backing: Backing::Memory,
            recs: T::default(),
            opts: 0,
            txn: None,
        }
    }

    pub(crate) fn file(path: CString, file: DbFile, recs: T, opts: u8) -> Self {
        Self {
            backing: Backing::File { path, file },
            recs,
            opts,
            txn: None,
        }
    }

    /// Fails with `TCEINVALID` unless the database accepts writes.
    pub(crate) fn require_writer(&self) -> Result<(), c_int> {
        match &self.backing {
            Backing::Memory => Ok(()),
            Backing::File { file, .. } if file.writable() => Ok(()),
            Backing::File { .. } => Err(TCEINVALID),
        }
    }

    /// Writes every record to the backing file.
    pub(crate) fn flush(&mut self) -> Result<(), c_int> {
        let snapshot = match &self.txn {
            Some(saved) => saved.snapshot(),
            None => self.recs.snapshot(),
        };
        match &mut self.backing {
            Backing::File { file, .. } if file.writable() => file.write(T::KIND, self.opts, &snapshot),
            _ => Ok(()),
        }
    }

    /// Writes every record and forces the file to the disk.
    pub(crate) fn sync(&mut self) -> Result<(), c_int> {
        self.require_writer()?;
        self.flush()?;
        match &self.backing {
            Backing::File { file, .. } => file.sync_all(),
            Backing::Memory => Ok(()),
        }
    }

    pub(crate) fn begin(&mut self) -> Result<(), c_int> {
        self.require_writer()?;
        if self.txn.is_some() {
            return Err(TCEINVALID);
        }
        self.txn = Some(self.recs.clone());
        Ok(())
    }

    pub(crate) fn commit(&mut self) -> Result<(), c_int> {
        if self.txn.take().is_none() {
            return Err(TCEINVALID);
        }
        let tsync = matches!(&self.backing, Backing::File { file, .. } if file.tsync());
        if tsync {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn abort(&mut self) -> Result<(), c_int> {
        match self.txn.take() {
            Some(saved) => {
                self.recs = saved;
                Ok(())
            }
            None => Err(TCEINVALID),
        }
    }

    /// Rolls back any open transaction and writes the records out.
    pub(crate) fn close(mut self) -> Result<(), c_int> {
        if let Some(saved) = self.txn.take() {
            self.recs = saved;
        }
        self.flush()
    }

    pub(crate) fn copy(&self, path: &Path) -> Result<(), c_int> {
        file::copy_to(path, T::KIND, self.opts, &self.recs.snapshot())
    }

    pub(crate) fn fsiz(&self) -> Result<u64, c_int> {
        match &self.backing {
            Backing::File { file, .. } => file.size(),
            Backing::Memory => Ok(file::encoded_size(&self.recs.snapshot())),
        }
    }

    pub(crate) fn path(&self) -> Option<&CStr> {
        match &self.backing {
            Backing::File { path, .. } => Some(path.as_c_str()),
            Backing::Memory => None,
        }
    }
}

/// Merges a value into an existing one according to `mode`.
///
/// [`PutMode::Dup`] never merges and is rejected here.
pub(crate) fn merge(existing: &mut Vec<u8>, val: &[u8], mode: PutMode) -> Result<(), c_int> {
    match mode {
        PutMode::Over => {
            existing.clear();
            existing.extend_from_slice(val);
            Ok(())
        }
        PutMode::Keep => Err(TCEKEEP),
        PutMode::Cat => {
            existing.extend_from_slice(val);
            Ok(())
        }
        PutMode::Dup => Err(TCEINVALID),
    }
}

/// Adds to a stored native-endian 32-bit integer.
///
/// A missing record counts as zero; a record of another size fails with
/// `TCEKEEP`.
pub(crate) fn add_int(current: Option<&[u8]>, num: i32) -> Result<i32, c_int> {
    match current {
        None => Ok(num),
        Some(raw) => {
            let raw = <[u8; 4]>::try_from(raw).map_err(|_| TCEKEEP)?;
            Ok(i32::from_ne_bytes(raw).wrapping_add(num))
        }
    }
}

/// Adds to a stored native-endian double.
///
/// A missing record counts as zero; a record of another size fails with
/// `TCEKEEP`.
pub(crate) fn add_double(current: Option<&[u8]>, num: f64) -> Result<f64, c_int> {
    match current {
        None => Ok(num),
        Some(raw) => {
            let raw = <[u8; 8]>::try_from(raw).map_err(|_| TCEKEEP)?;
            Ok(f64::from_ne_bytes(raw) + num)
        }
    }
}

/// Reads a C path argument.
pub(crate) unsafe fn path_arg<'a>(path: *const std::ffi::c_char) -> Result<(&'a Path, CString), c_int> {
    if path.is_null() {
        return Err(TCEINVALID);
    }
    let cpath = CStr::from_ptr(path);
    let path = cpath.to_str().map_err(|_| TCEINVALID)?;
    Ok((Path::new(path), cpath.to_owned()))
}
