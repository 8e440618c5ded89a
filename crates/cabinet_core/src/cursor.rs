//! B-tree cursors.

use crate::bdb::{Bdb, BdbInner};
use crate::buffer::{c_buf, NativeBuf};
use crate::error::{Error, Result};
use crate::permit::released;
use cabinet_sys::BDBCUR;
use std::ffi::c_int;
use std::ptr::NonNull;
use std::sync::Arc;

/// Where [`Cursor::put`] stores its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorPut {
    /// Overwrite the value under the cursor.
    #[default]
    Current,
    /// Insert before the value under the cursor.
    Before,
    /// Insert after the value under the cursor.
    After,
}

impl CursorPut {
    const fn mode(self) -> c_int {
        match self {
            CursorPut::Current => cabinet_sys::BDBCPCURRENT,
            CursorPut::Before => cabinet_sys::BDBCPBEFORE,
            CursorPut::After => cabinet_sys::BDBCPAFTER,
        }
    }
}

/// A cursor over a B-tree database.
///
/// A cursor holds a reference to its database, which therefore stays alive
/// as long as the cursor does. After the database is closed, every cursor
/// operation fails.
///
/// ```
/// use cabinet_core::{Bdb, OpenMode};
///
/// let dir = tempfile::tempdir()?;
/// let db = Bdb::new()?;
/// db.open(dir.path().join("casket.tcb"), OpenMode::WRITE_CREATE)?;
/// db.put(b"a", b"1")?;
/// db.put(b"b", b"2")?;
///
/// let mut cur = db.cursor()?;
/// cur.first()?;
/// assert_eq!(&*cur.key()?, b"a");
/// cur.next()?;
/// assert_eq!(&*cur.val()?, b"2");
/// assert!(cur.next().unwrap_err().is_not_found());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Cursor {
    raw: NonNull<BDBCUR>,
    db: Arc<BdbInner>,
}

// Cursor methods take `&mut self`, and the engine serializes access to the
// database it points into.
unsafe impl Send for Cursor {}

impl Cursor {
    pub(crate) fn new(db: &Bdb) -> Result<Self> {
        let inner = db.inner().clone();
        let raw = unsafe { cabinet_sys::tcbdbcurnew(inner.raw()) };
        let raw = NonNull::new(raw).ok_or_else(|| Error::binding("tcbdbcurnew", "failed to allocate a cursor"))?;
        tracing::debug!(refs = Arc::strong_count(&inner), "cursor created");
        Ok(Self { raw, db: inner })
    }

    /// The database this cursor belongs to.
    pub fn db(&self) -> Bdb {
        Bdb::from_inner(self.db.clone())
    }

    fn step(&mut self, function: &'static str, call: unsafe extern "C" fn(*mut BDBCUR) -> bool) -> Result<()> {
        let raw = self.raw.as_ptr();
        let ok = released(|| unsafe { call(raw) });
        self.db.check(ok, function)
    }

    /// Moves to the first record.
    pub fn first(&mut self) -> Result<()> {
        self.step("tcbdbcurfirst", cabinet_sys::tcbdbcurfirst)
    }

    /// Moves to the last value of the last record.
    pub fn last(&mut self) -> Result<()> {
        self.step("tcbdbcurlast", cabinet_sys::tcbdbcurlast)
    }

    /// Moves to the first record whose key is not less than `key`.
    pub fn jump(&mut self, key: &[u8]) -> Result<()> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbcurjump")?;
        let raw = self.raw.as_ptr();
        let ok = released(|| unsafe { cabinet_sys::tcbdbcurjump(raw, kbuf, ksiz) });
        self.db.check(ok, "tcbdbcurjump")
    }

    /// Moves to the next value. Fails at the end.
    pub fn next(&mut self) -> Result<()> {
        self.step("tcbdbcurnext", cabinet_sys::tcbdbcurnext)
    }

    /// Moves to the previous value. Fails at the beginning.
    pub fn prev(&mut self) -> Result<()> {
        self.step("tcbdbcurprev", cabinet_sys::tcbdbcurprev)
    }

    /// Stores a value relative to the cursor and moves onto it.
    pub fn put(&mut self, value: &[u8], mode: CursorPut) -> Result<()> {
        let (vbuf, vsiz) = c_buf(value, "tcbdbcurput")?;
        let raw = self.raw.as_ptr();
        let ok = released(|| unsafe { cabinet_sys::tcbdbcurput(raw, vbuf, vsiz, mode.mode()) });
        self.db.check(ok, "tcbdbcurput")
    }

    /// Removes the value under the cursor and moves to the next one.
    pub fn out(&mut self) -> Result<()> {
        self.step("tcbdbcurout", cabinet_sys::tcbdbcurout)
    }

    /// The key under the cursor.
    pub fn key(&mut self) -> Result<NativeBuf> {
        let raw = self.raw.as_ptr();
        let mut len: c_int = 0;
        let ptr = released(|| unsafe { cabinet_sys::tcbdbcurkey(raw, &mut len) });
        unsafe { NativeBuf::from_raw(ptr, len) }.ok_or_else(|| self.db.error("tcbdbcurkey"))
    }

    /// The value under the cursor.
    pub fn val(&mut self) -> Result<NativeBuf> {
        let raw = self.raw.as_ptr();
        let mut len: c_int = 0;
        let ptr = released(|| unsafe { cabinet_sys::tcbdbcurval(raw, &mut len) });
        unsafe { NativeBuf::from_raw(ptr, len) }.ok_or_else(|| self.db.error("tcbdbcurval"))
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        // The cursor goes before the reference it holds on the database.
        unsafe { cabinet_sys::tcbdbcurdel(self.raw.as_ptr()) };
        tracing::debug!(refs = Arc::strong_count(&self.db) - 1, "cursor destroyed");
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, OpenMode};
    use tempfile::TempDir;

    fn filled(dir: &TempDir) -> Bdb {
        let db = Bdb::new().unwrap();
        db.open(dir.path().join("cur.tcb"), OpenMode::WRITE_CREATE).unwrap();
        for key in [&b"b"[..], b"a", b"c"] {
            db.put(key, key).unwrap();
        }
        db
    }

    #[test]
    fn unpositioned_cursor_fails() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        let mut cur = db.cursor().unwrap();
        assert!(cur.key().is_err());
        assert!(cur.val().is_err());
        assert!(cur.out().is_err());
    }

    #[test]
    fn first_on_empty_database_fails() {
        let dir = TempDir::new().unwrap();
        let db = Bdb::new().unwrap();
        db.open(dir.path().join("empty.tcb"), OpenMode::WRITE_CREATE).unwrap();
        let mut cur = db.cursor().unwrap();
        assert!(cur.first().unwrap_err().is_not_found());
        assert!(cur.last().unwrap_err().is_not_found());
    }

    #[test]
    fn walks_backwards() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        let mut cur = db.cursor().unwrap();
        cur.last().unwrap();
        assert_eq!(&*cur.key().unwrap(), b"c");
        cur.prev().unwrap();
        cur.prev().unwrap();
        assert_eq!(&*cur.key().unwrap(), b"a");
        assert!(cur.prev().unwrap_err().is_not_found());
    }

    #[test]
    fn jump_lands_on_next_key() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        let mut cur = db.cursor().unwrap();
        cur.jump(b"bb").unwrap();
        assert_eq!(&*cur.key().unwrap(), b"c");
        assert!(cur.jump(b"d").unwrap_err().is_not_found());
    }

    #[test]
    fn put_modes() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        let mut cur = db.cursor().unwrap();
        cur.jump(b"b").unwrap();
        cur.put(b"B", CursorPut::Current).unwrap();
        cur.put(b"0", CursorPut::Before).unwrap();
        cur.put(b"2", CursorPut::After).unwrap();
        assert_eq!(&*cur.val().unwrap(), b"2");

        let vals = db.getlist(b"b").unwrap().to_vec();
        assert_eq!(vals, vec![b"0".to_vec(), b"2".to_vec(), b"B".to_vec()]);
    }

    #[test]
    fn out_advances() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        let mut cur = db.cursor().unwrap();
        cur.first().unwrap();
        cur.out().unwrap();
        assert_eq!(&*cur.key().unwrap(), b"b");
        assert_eq!(db.rnum().unwrap(), 2);
    }

    #[test]
    fn fails_after_close() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        let mut cur = db.cursor().unwrap();
        cur.first().unwrap();
        db.close().unwrap();
        assert_eq!(cur.next().unwrap_err().kind, ErrorKind::Invalid);
        assert_eq!(cur.key().unwrap_err().kind, ErrorKind::Invalid);
    }

    #[test]
    fn holds_a_reference() {
        let dir = TempDir::new().unwrap();
        let db = filled(&dir);
        assert_eq!(db.ref_count(), 1);
        let cur = db.cursor().unwrap();
        assert_eq!(db.ref_count(), 2);
        assert!(cur.db().is_open());
        drop(cur);
        assert_eq!(db.ref_count(), 1);
    }
}
