//! B-tree database handles.

use crate::buffer::{c_buf, NativeBuf};
use crate::comparator::{trampoline, Comparator, ComparatorSlot};
use crate::config::{BdbCache, BdbTuning, OpenMode};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::list::List;
use crate::path_to_cstring;
use crate::permit::released;
use cabinet_sys::TCBDB;
use parking_lot::RwLock;
use std::ffi::{c_int, CStr};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared between a B-tree handle and its cursors.
pub(crate) struct BdbInner {
    raw: NonNull<TCBDB>,
    open: AtomicBool,
    comparator: ComparatorSlot,
    // Held for writing across open and close, for reading while the path
    // string the engine lends out is copied.
    lifecycle: RwLock<()>,
}

// The engine handle runs with its internal mutex enabled.
unsafe impl Send for BdbInner {}
unsafe impl Sync for BdbInner {}

impl BdbInner {
    pub(crate) fn raw(&self) -> *mut TCBDB {
        self.raw.as_ptr()
    }

    /// The error recorded by the engine for the last failed call.
    pub(crate) fn error(&self, function: &'static str) -> Error {
        Error::engine(unsafe { cabinet_sys::tcbdbecode(self.raw()) }, function)
    }

    pub(crate) fn check(&self, ok: bool, function: &'static str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(self.error(function))
        }
    }

    fn require_open(&self, function: &'static str) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::engine(cabinet_sys::TCEINVALID, function))
        }
    }

    /// Drops the host comparator and points the engine back at lexical
    /// order. Only possible while the database is closed.
    fn reset_comparator(&self) {
        let raw = self.raw();
        let reset = released(|| unsafe { cabinet_sys::tcbdbsetcmpfunc(raw, cabinet_sys::tccmplexical, ptr::null_mut()) });
        if !reset {
            tracing::warn!(error = %self.error("tcbdbsetcmpfunc"), "failed to reset B-tree comparator");
        }
        self.comparator.replace(None);
    }
}

impl Drop for BdbInner {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let raw = self.raw();
            if !released(|| unsafe { cabinet_sys::tcbdbclose(raw) }) {
                tracing::warn!(error = %self.error("tcbdbclose"), "failed to close B-tree database on drop");
            }
        }
        self.reset_comparator();
        let raw = self.raw();
        released(|| unsafe { cabinet_sys::tcbdbdel(raw) });
        tracing::debug!("B-tree handle destroyed");
    }
}

/// A B-tree database handle.
///
/// Clones share the same engine instance, as do the [`Cursor`]s created from
/// it. The engine instance is destroyed when the last of them is dropped;
/// [`Bdb::close`] closes the database at once regardless.
#[derive(Clone)]
pub struct Bdb {
    inner: Arc<BdbInner>,
}

macro_rules! key_fn {
    ($(#[$doc:meta])* $name:ident => $native:ident) => {
        $(#[$doc])*
        pub fn $name(&self, key: &[u8]) -> Result<()> {
            let (kbuf, ksiz) = c_buf(key, stringify!($native))?;
            let raw = self.raw();
            let ok = released(|| unsafe { cabinet_sys::$native(raw, kbuf, ksiz) });
            self.inner.check(ok, stringify!($native))
        }
    };
}

macro_rules! put_fn {
    ($(#[$doc:meta])* $name:ident => $native:ident) => {
        $(#[$doc])*
        pub fn $name(&self, key: &[u8], value: &[u8]) -> Result<()> {
            let (kbuf, ksiz) = c_buf(key, stringify!($native))?;
            let (vbuf, vsiz) = c_buf(value, stringify!($native))?;
            let raw = self.raw();
            let ok = released(|| unsafe { cabinet_sys::$native(raw, kbuf, ksiz, vbuf, vsiz) });
            self.inner.check(ok, stringify!($native))
        }
    };
}

macro_rules! unit_fn {
    ($(#[$doc:meta])* $name:ident => $native:ident) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<()> {
            let raw = self.raw();
            let ok = released(|| unsafe { cabinet_sys::$native(raw) });
            self.inner.check(ok, stringify!($native))
        }
    };
}

impl Bdb {
    /// Creates a closed handle ordered lexically.
    pub fn new() -> Result<Self> {
        let raw = NonNull::new(cabinet_sys::tcbdbnew())
            .ok_or_else(|| Error::binding("tcbdbnew", "failed to allocate a B-tree handle"))?;
        let inner = Arc::new(BdbInner {
            raw,
            open: AtomicBool::new(false),
            comparator: ComparatorSlot::default(),
            lifecycle: RwLock::new(()),
        });
        let raw = inner.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdbsetmutex(raw) });
        inner.check(ok, "tcbdbsetmutex")?;
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<BdbInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<BdbInner> {
        &self.inner
    }

    fn raw(&self) -> *mut TCBDB {
        self.inner.raw()
    }

    /// Number of live references to the engine instance: handle clones plus
    /// cursors.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns true while the database is open.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Sets the key ordering. Only possible while the database is closed.
    ///
    /// The previously installed host function is released. If the engine
    /// refuses the new ordering, the previous one stays installed.
    pub fn set_comparator(&self, comparator: Comparator) -> Result<()> {
        let raw = self.raw();
        let slot = &self.inner.comparator;
        let (func, op) = match comparator.builtin() {
            Some(func) => (func, ptr::null_mut()),
            None => (trampoline as cabinet_sys::TCCMP, slot.as_op()),
        };
        tracing::debug!(?comparator, "setting B-tree comparator");

        // The engine only accepts a comparator while closed, when nothing
        // compares keys, so the slot can follow the engine.
        let ok = released(|| unsafe { cabinet_sys::tcbdbsetcmpfunc(raw, func, op) });
        self.inner.check(ok, "tcbdbsetcmpfunc")?;
        slot.replace(comparator.host());
        Ok(())
    }

    /// Restores lexical ordering, releasing any host function.
    pub fn clear_comparator(&self) -> Result<()> {
        self.set_comparator(Comparator::Lexical)
    }

    /// Returns and clears the fault raised by a panicking host comparator.
    ///
    /// A panicking comparator makes the engine treat the keys as equal; the
    /// operation that triggered it still reports success.
    pub fn take_comparator_fault(&self) -> Option<Error> {
        self.inner
            .comparator
            .take_fault()
            .map(|message| Error::binding("comparator", message))
    }

    /// Sets tuning parameters. Only possible while the database is closed.
    pub fn tune(&self, tuning: &BdbTuning) -> Result<()> {
        let (lmemb, nmemb, bnum, apow, fpow, opts) = tuning.raw();
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdbtune(raw, lmemb, nmemb, bnum, apow, fpow, opts) });
        self.inner.check(ok, "tcbdbtune")
    }

    /// Sets node cache sizes. Only possible while the database is closed.
    pub fn set_cache(&self, cache: BdbCache) -> Result<()> {
        let (lcnum, ncnum) = cache.raw();
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdbsetcache(raw, lcnum, ncnum) });
        self.inner.check(ok, "tcbdbsetcache")
    }

    /// Sets the extra mapped memory size. Only possible while closed.
    pub fn set_xmsiz(&self, xmsiz: Option<i64>) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdbsetxmsiz(raw, xmsiz.unwrap_or(-1)) });
        self.inner.check(ok, "tcbdbsetxmsiz")
    }

    /// Sets the auto defragmentation unit. Only possible while closed.
    pub fn set_dfunit(&self, dfunit: Option<i32>) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdbsetdfunit(raw, dfunit.unwrap_or(-1)) });
        self.inner.check(ok, "tcbdbsetdfunit")
    }

    /// Opens a database file. No modes means read-only.
    pub fn open(&self, path: impl AsRef<Path>, modes: &[OpenMode]) -> Result<()> {
        let path = path.as_ref();
        let cpath = path_to_cstring(path, "tcbdbopen")?;
        let omode = OpenMode::fold(modes);
        let raw = self.raw();
        let lifecycle = &self.inner.lifecycle;
        let ok = released(|| {
            let _open = lifecycle.write();
            unsafe { cabinet_sys::tcbdbopen(raw, cpath.as_ptr(), omode) }
        });
        self.inner.check(ok, "tcbdbopen")?;
        self.inner.open.store(true, Ordering::Release);
        tracing::debug!(path = %path.display(), omode, "opened B-tree database");
        Ok(())
    }

    /// Closes the database now, whatever other references exist.
    ///
    /// Any host comparator is released and the ordering reset to lexical.
    pub fn close(&self) -> Result<()> {
        let raw = self.raw();
        let lifecycle = &self.inner.lifecycle;
        let ok = released(|| {
            let _close = lifecycle.write();
            unsafe { cabinet_sys::tcbdbclose(raw) }
        });
        let result = self.inner.check(ok, "tcbdbclose");
        if self.inner.open.swap(false, Ordering::AcqRel) {
            tracing::debug!(host_comparator = self.inner.comparator.is_set(), "closed B-tree database");
            self.inner.reset_comparator();
        }
        result
    }

    put_fn!(
        /// Stores a record, overwriting the first value of an existing key.
        put => tcbdbput
    );
    put_fn!(
        /// Stores a record; fails with [`crate::ErrorKind::Keep`] if the key exists.
        putkeep => tcbdbputkeep
    );
    put_fn!(
        /// Appends to the first value of a record, creating it if missing.
        putcat => tcbdbputcat
    );
    put_fn!(
        /// Adds a value after the existing values of a key.
        putdup => tcbdbputdup
    );

    /// Adds every element of `values` as a value of `key`.
    pub fn putlist(&self, key: &[u8], values: &List) -> Result<()> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbputdup3")?;
        let raw = self.raw();
        let vals = values.as_ptr();
        let ok = released(|| unsafe { cabinet_sys::tcbdbputdup3(raw, kbuf, ksiz, vals) });
        self.inner.check(ok, "tcbdbputdup3")
    }

    key_fn!(
        /// Removes the first value of a key.
        out => tcbdbout
    );
    key_fn!(
        /// Removes every value of a key.
        outlist => tcbdbout3
    );

    /// Retrieves the first value of a key.
    pub fn get(&self, key: &[u8]) -> Result<NativeBuf> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbget")?;
        let raw = self.raw();
        let mut len: c_int = 0;
        let ptr = released(|| unsafe { cabinet_sys::tcbdbget(raw, kbuf, ksiz, &mut len) });
        unsafe { NativeBuf::from_raw(ptr, len) }.ok_or_else(|| self.inner.error("tcbdbget"))
    }

    /// Retrieves every value of a key.
    pub fn getlist(&self, key: &[u8]) -> Result<List> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbget4")?;
        let raw = self.raw();
        let list = released(|| unsafe { cabinet_sys::tcbdbget4(raw, kbuf, ksiz) });
        unsafe { List::from_raw(list) }.ok_or_else(|| self.inner.error("tcbdbget4"))
    }

    /// Number of values stored under a key.
    pub fn vnum(&self, key: &[u8]) -> Result<usize> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbvnum")?;
        let raw = self.raw();
        let n = released(|| unsafe { cabinet_sys::tcbdbvnum(raw, kbuf, ksiz) });
        usize::try_from(n).map_err(|_| self.inner.error("tcbdbvnum"))
    }

    /// Size of the first value of a key.
    pub fn vsiz(&self, key: &[u8]) -> Result<usize> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbvsiz")?;
        let raw = self.raw();
        let n = released(|| unsafe { cabinet_sys::tcbdbvsiz(raw, kbuf, ksiz) });
        usize::try_from(n).map_err(|_| self.inner.error("tcbdbvsiz"))
    }

    /// Lists keys between two bounds in comparator order.
    ///
    /// `None` bounds are open; `max` of `None` means no limit.
    pub fn range(
        &self,
        begin: Option<&[u8]>,
        begin_inclusive: bool,
        end: Option<&[u8]>,
        end_inclusive: bool,
        max: Option<usize>,
    ) -> Result<List> {
        let (bkbuf, bksiz) = match begin {
            Some(key) => c_buf(key, "tcbdbrange")?,
            None => (ptr::null(), 0),
        };
        let (ekbuf, eksiz) = match end {
            Some(key) => c_buf(key, "tcbdbrange")?,
            None => (ptr::null(), 0),
        };
        let max = limit(max);
        let raw = self.raw();
        let list = released(|| unsafe {
            cabinet_sys::tcbdbrange(raw, bkbuf, bksiz, begin_inclusive, ekbuf, eksiz, end_inclusive, max)
        });
        unsafe { List::from_raw(list) }.ok_or_else(|| self.inner.error("tcbdbrange"))
    }

    /// Lists keys starting with `prefix`, at most `max` of them.
    pub fn fwmkeys(&self, prefix: &[u8], max: Option<usize>) -> Result<List> {
        let (pbuf, psiz) = c_buf(prefix, "tcbdbfwmkeys")?;
        let max = limit(max);
        let raw = self.raw();
        let list = released(|| unsafe { cabinet_sys::tcbdbfwmkeys(raw, pbuf, psiz, max) });
        unsafe { List::from_raw(list) }.ok_or_else(|| self.inner.error("tcbdbfwmkeys"))
    }

    /// Adds to an integer record and returns the new value.
    pub fn addint(&self, key: &[u8], delta: i32) -> Result<i32> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbaddint")?;
        let raw = self.raw();
        let sum = released(|| unsafe { cabinet_sys::tcbdbaddint(raw, kbuf, ksiz, delta) });
        if sum == i32::MIN {
            return Err(self.inner.error("tcbdbaddint"));
        }
        Ok(sum)
    }

    /// Adds to a real-number record and returns the new value.
    pub fn adddouble(&self, key: &[u8], delta: f64) -> Result<f64> {
        let (kbuf, ksiz) = c_buf(key, "tcbdbadddouble")?;
        let raw = self.raw();
        let sum = released(|| unsafe { cabinet_sys::tcbdbadddouble(raw, kbuf, ksiz, delta) });
        if sum.is_nan() {
            return Err(self.inner.error("tcbdbadddouble"));
        }
        Ok(sum)
    }

    unit_fn!(
        /// Writes all records to the disk.
        sync => tcbdbsync
    );

    /// Retunes the open database and rewrites its file.
    pub fn optimize(&self, tuning: &BdbTuning) -> Result<()> {
        let (lmemb, nmemb, bnum, apow, fpow, opts) = tuning.raw();
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdboptimize(raw, lmemb, nmemb, bnum, apow, fpow, opts) });
        self.inner.check(ok, "tcbdboptimize")
    }

    unit_fn!(
        /// Removes every record.
        vanish => tcbdbvanish
    );

    /// Writes a copy of the database to `path`.
    pub fn copy(&self, path: impl AsRef<Path>) -> Result<()> {
        let cpath = path_to_cstring(path.as_ref(), "tcbdbcopy")?;
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcbdbcopy(raw, cpath.as_ptr()) });
        self.inner.check(ok, "tcbdbcopy")
    }

    unit_fn!(
        /// Begins a transaction.
        tranbegin => tcbdbtranbegin
    );
    unit_fn!(
        /// Commits the open transaction.
        trancommit => tcbdbtrancommit
    );
    unit_fn!(
        /// Aborts the open transaction.
        tranabort => tcbdbtranabort
    );

    /// The file path of the open database.
    pub fn path(&self) -> Result<String> {
        let raw = self.raw();
        let lifecycle = &self.inner.lifecycle;
        // The engine's string lives until close, so copy it before a clone
        // can get there.
        let path = released(|| {
            let _open = lifecycle.read();
            let ptr = unsafe { cabinet_sys::tcbdbpath(raw) };
            (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        });
        path.ok_or_else(|| self.inner.error("tcbdbpath"))
    }

    /// Number of stored values. An empty open database has zero.
    pub fn rnum(&self) -> Result<u64> {
        self.inner.require_open("tcbdbrnum")?;
        let raw = self.raw();
        Ok(released(|| unsafe { cabinet_sys::tcbdbrnum(raw) }))
    }

    /// Size of the database file in bytes.
    pub fn fsiz(&self) -> Result<u64> {
        self.inner.require_open("tcbdbfsiz")?;
        let raw = self.raw();
        Ok(released(|| unsafe { cabinet_sys::tcbdbfsiz(raw) }))
    }

    /// Creates an unpositioned cursor sharing this handle.
    pub fn cursor(&self) -> Result<Cursor> {
        Cursor::new(self)
    }
}

impl std::fmt::Debug for Bdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdb")
            .field("open", &self.is_open())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Converts an optional limit to the engine's "negative means unlimited".
pub(crate) fn limit(max: Option<usize>) -> c_int {
    max.map_or(-1, |m| c_int::try_from(m).unwrap_or(c_int::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn open_bdb(dir: &TempDir) -> Bdb {
        let db = Bdb::new().unwrap();
        db.open(dir.path().join("test.tcb"), OpenMode::WRITE_CREATE).unwrap();
        db
    }

    #[test]
    fn closed_handle_operations_fail() {
        let db = Bdb::new().unwrap();
        let err = db.put(b"k", b"v").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
        assert_eq!(err.function, "tcbdbput");
        assert_eq!(db.rnum().unwrap_err().kind, ErrorKind::Invalid);
    }

    #[test]
    fn empty_database_has_zero_records() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        assert_eq!(db.rnum().unwrap(), 0);
        assert!(db.fsiz().unwrap() > 0);
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        assert!(db.get(b"nope").unwrap_err().is_not_found());
        assert!(db.out(b"nope").unwrap_err().is_not_found());
        assert!(db.vsiz(b"nope").unwrap_err().is_not_found());
        assert!(db.vnum(b"nope").unwrap_err().is_not_found());
        assert!(db.getlist(b"nope").unwrap_err().is_not_found());
    }

    #[test]
    fn duplicates() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        db.putdup(b"k", b"1").unwrap();
        db.putdup(b"k", b"2").unwrap();
        let more = List::from_items([&b"3"[..], b"4"]).unwrap();
        db.putlist(b"k", &more).unwrap();

        assert_eq!(db.vnum(b"k").unwrap(), 4);
        assert_eq!(&*db.get(b"k").unwrap(), b"1");
        assert_eq!(db.getlist(b"k").unwrap().to_vec()[3], b"4".to_vec());
        db.out(b"k").unwrap();
        assert_eq!(&*db.get(b"k").unwrap(), b"2");
        db.outlist(b"k").unwrap();
        assert_eq!(db.rnum().unwrap(), 0);
    }

    #[test]
    fn addint_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        assert_eq!(db.addint(b"n", 2).unwrap(), 2);
        assert_eq!(db.addint(b"n", 3).unwrap(), 5);
        db.put(b"s", b"not a number").unwrap();
        assert_eq!(db.addint(b"s", 1).unwrap_err().kind, ErrorKind::Keep);
        assert_eq!(db.adddouble(b"s", 1.0).unwrap_err().kind, ErrorKind::Keep);
        assert_eq!(db.adddouble(b"d", 1.5).unwrap(), 1.5);
    }

    #[test]
    fn setters_rejected_while_open() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        assert_eq!(db.tune(&BdbTuning::new()).unwrap_err().kind, ErrorKind::Invalid);
        assert_eq!(db.set_cache(BdbCache::new()).unwrap_err().kind, ErrorKind::Invalid);
        assert_eq!(db.set_comparator(Comparator::Decimal).unwrap_err().kind, ErrorKind::Invalid);
        db.close().unwrap();
        db.tune(&BdbTuning::new().lmemb(64)).unwrap();
        db.set_comparator(Comparator::Decimal).unwrap();
    }

    #[test]
    fn failed_install_keeps_previous_comparator() {
        let dir = TempDir::new().unwrap();
        let db = Bdb::new().unwrap();
        db.set_comparator(Comparator::raw(|a, b| b.cmp(a))).unwrap();
        db.open(dir.path().join("rev.tcb"), OpenMode::WRITE_CREATE).unwrap();

        assert!(db.set_comparator(Comparator::Lexical).is_err());
        assert!(db.inner.comparator.is_set());
        db.put(b"a", b"").unwrap();
        db.put(b"b", b"").unwrap();
        let keys = db.range(None, true, None, true, None).unwrap();
        assert_eq!(keys.to_vec(), vec![b"b".to_vec(), b"a".to_vec()]);

        db.close().unwrap();
        assert!(!db.inner.comparator.is_set());
    }

    #[test]
    fn transaction_abort() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        db.put(b"a", b"1").unwrap();
        db.tranbegin().unwrap();
        db.put(b"b", b"2").unwrap();
        db.tranabort().unwrap();
        assert!(db.get(b"b").unwrap_err().is_not_found());
        assert_eq!(db.trancommit().unwrap_err().kind, ErrorKind::Invalid);
    }

    #[test]
    fn path_reports_file() {
        let dir = TempDir::new().unwrap();
        let db = open_bdb(&dir);
        assert!(db.path().unwrap().ends_with("test.tcb"));
        db.close().unwrap();
        assert!(db.path().is_err());
    }

    #[test]
    fn nul_in_path_is_binding_error() {
        let db = Bdb::new().unwrap();
        let err = db.open("bad\0path.tcb", OpenMode::WRITE_CREATE).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Misc);
    }
}
