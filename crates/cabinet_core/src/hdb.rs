//! Hash database handles.

use crate::bdb::limit;
use crate::buffer::{c_buf, NativeBuf};
use crate::config::{HdbTuning, OpenMode};
use crate::error::{Error, Result};
use crate::list::List;
use crate::path_to_cstring;
use crate::permit::released;
use cabinet_sys::TCHDB;
use parking_lot::RwLock;
use std::ffi::{c_int, CStr};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

/// A hash database handle.
pub struct Hdb {
    raw: NonNull<TCHDB>,
    open: AtomicBool,
    // Write-held across open and close, read-held while the path is copied.
    lifecycle: RwLock<()>,
}

// The engine handle runs with its internal mutex enabled.
unsafe impl Send for Hdb {}
unsafe impl Sync for Hdb {}

impl Hdb {
    /// Creates a closed handle.
    pub fn new() -> Result<Self> {
        let raw = NonNull::new(cabinet_sys::tchdbnew())
            .ok_or_else(|| Error::binding("tchdbnew", "failed to allocate a hash handle"))?;
        let hdb = Self {
            raw,
            open: AtomicBool::new(false),
            lifecycle: RwLock::new(()),
        };
        let raw = hdb.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbsetmutex(raw) });
        hdb.check(ok, "tchdbsetmutex")?;
        Ok(hdb)
    }

    fn raw(&self) -> *mut TCHDB {
        self.raw.as_ptr()
    }

    fn error(&self, function: &'static str) -> Error {
        Error::engine(unsafe { cabinet_sys::tchdbecode(self.raw()) }, function)
    }

    fn check(&self, ok: bool, function: &'static str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(self.error(function))
        }
    }

    /// Returns true while the database is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Sets tuning parameters. Only possible while the database is closed.
    pub fn tune(&self, tuning: &HdbTuning) -> Result<()> {
        let (bnum, apow, fpow, opts) = tuning.raw();
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbtune(raw, bnum, apow, fpow, opts) });
        self.check(ok, "tchdbtune")
    }

    /// Sets the record cache size. Only possible while closed.
    pub fn set_cache(&self, rcnum: Option<i32>) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbsetcache(raw, rcnum.unwrap_or(-1)) });
        self.check(ok, "tchdbsetcache")
    }

    /// Sets the extra mapped memory size. Only possible while closed.
    pub fn set_xmsiz(&self, xmsiz: Option<i64>) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbsetxmsiz(raw, xmsiz.unwrap_or(-1)) });
        self.check(ok, "tchdbsetxmsiz")
    }

    /// Sets the auto defragmentation unit. Only possible while closed.
    pub fn set_dfunit(&self, dfunit: Option<i32>) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbsetdfunit(raw, dfunit.unwrap_or(-1)) });
        self.check(ok, "tchdbsetdfunit")
    }

    /// Opens a database file. No modes means read-only.
    pub fn open(&self, path: impl AsRef<Path>, modes: &[OpenMode]) -> Result<()> {
        let path = path.as_ref();
        let cpath = path_to_cstring(path, "tchdbopen")?;
        let omode = OpenMode::fold(modes);
        let raw = self.raw();
        let lifecycle = &self.lifecycle;
        let ok = released(|| {
            let _open = lifecycle.write();
            unsafe { cabinet_sys::tchdbopen(raw, cpath.as_ptr(), omode) }
        });
        self.check(ok, "tchdbopen")?;
        self.open.store(true, Ordering::Release);
        tracing::debug!(path = %path.display(), omode, "opened hash database");
        Ok(())
    }

    /// Closes the database.
    pub fn close(&self) -> Result<()> {
        let raw = self.raw();
        let lifecycle = &self.lifecycle;
        let ok = released(|| {
            let _close = lifecycle.write();
            unsafe { cabinet_sys::tchdbclose(raw) }
        });
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!("closed hash database");
        }
        self.check(ok, "tchdbclose")
    }

    fn put_with(
        &self,
        key: &[u8],
        value: &[u8],
        function: &'static str,
        native: unsafe extern "C" fn(*mut TCHDB, *const std::ffi::c_void, c_int, *const std::ffi::c_void, c_int) -> bool,
    ) -> Result<()> {
        let (kbuf, ksiz) = c_buf(key, function)?;
        let (vbuf, vsiz) = c_buf(value, function)?;
        let raw = self.raw();
        let ok = released(|| unsafe { native(raw, kbuf, ksiz, vbuf, vsiz) });
        self.check(ok, function)
    }

    /// Stores a record, overwriting any existing value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, "tchdbput", cabinet_sys::tchdbput)
    }

    /// Stores a record; fails with [`crate::ErrorKind::Keep`] if the key exists.
    pub fn putkeep(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, "tchdbputkeep", cabinet_sys::tchdbputkeep)
    }

    /// Appends to a record's value, creating it if missing.
    pub fn putcat(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, "tchdbputcat", cabinet_sys::tchdbputcat)
    }

    /// Removes a record.
    pub fn out(&self, key: &[u8]) -> Result<()> {
        let (kbuf, ksiz) = c_buf(key, "tchdbout")?;
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbout(raw, kbuf, ksiz) });
        self.check(ok, "tchdbout")
    }

    /// Retrieves a record's value.
    pub fn get(&self, key: &[u8]) -> Result<NativeBuf> {
        let (kbuf, ksiz) = c_buf(key, "tchdbget")?;
        let raw = self.raw();
        let mut len: c_int = 0;
        let ptr = released(|| unsafe { cabinet_sys::tchdbget(raw, kbuf, ksiz, &mut len) });
        unsafe { NativeBuf::from_raw(ptr, len) }.ok_or_else(|| self.error("tchdbget"))
    }

    /// Size of a record's value.
    pub fn vsiz(&self, key: &[u8]) -> Result<usize> {
        let (kbuf, ksiz) = c_buf(key, "tchdbvsiz")?;
        let raw = self.raw();
        let n = released(|| unsafe { cabinet_sys::tchdbvsiz(raw, kbuf, ksiz) });
        usize::try_from(n).map_err(|_| self.error("tchdbvsiz"))
    }

    /// Resets the record iterator.
    pub fn iterinit(&self) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbiterinit(raw) });
        self.check(ok, "tchdbiterinit")
    }

    /// Returns the next record of the iterator, or `None` past the last one.
    pub fn iternext(&self) -> Result<Option<(NativeBuf, NativeBuf)>> {
        let raw = self.raw();
        let mut len: c_int = 0;
        let kptr = released(|| unsafe { cabinet_sys::tchdbiternext(raw, &mut len) });
        let Some(key) = (unsafe { NativeBuf::from_raw(kptr, len) }) else {
            let err = self.error("tchdbiternext");
            return if err.is_not_found() { Ok(None) } else { Err(err) };
        };
        // The record may be removed between the two calls.
        let value = self.get(&key)?;
        Ok(Some((key, value)))
    }

    /// Lists keys starting with `prefix`, at most `max` of them.
    pub fn fwmkeys(&self, prefix: &[u8], max: Option<usize>) -> Result<List> {
        let (pbuf, psiz) = c_buf(prefix, "tchdbfwmkeys")?;
        let max = limit(max);
        let raw = self.raw();
        let list = released(|| unsafe { cabinet_sys::tchdbfwmkeys(raw, pbuf, psiz, max) });
        unsafe { List::from_raw(list) }.ok_or_else(|| self.error("tchdbfwmkeys"))
    }

    /// Adds to an integer record and returns the new value.
    pub fn addint(&self, key: &[u8], delta: i32) -> Result<i32> {
        let (kbuf, ksiz) = c_buf(key, "tchdbaddint")?;
        let raw = self.raw();
        let sum = released(|| unsafe { cabinet_sys::tchdbaddint(raw, kbuf, ksiz, delta) });
        if sum == i32::MIN {
            return Err(self.error("tchdbaddint"));
        }
        Ok(sum)
    }

    /// Adds to a real-number record and returns the new value.
    pub fn adddouble(&self, key: &[u8], delta: f64) -> Result<f64> {
        let (kbuf, ksiz) = c_buf(key, "tchdbadddouble")?;
        let raw = self.raw();
        let sum = released(|| unsafe { cabinet_sys::tchdbadddouble(raw, kbuf, ksiz, delta) });
        if sum.is_nan() {
            return Err(self.error("tchdbadddouble"));
        }
        Ok(sum)
    }

    fn unit(&self, function: &'static str, native: unsafe extern "C" fn(*mut TCHDB) -> bool) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { native(raw) });
        self.check(ok, function)
    }

    /// Writes all records to the disk.
    pub fn sync(&self) -> Result<()> {
        self.unit("tchdbsync", cabinet_sys::tchdbsync)
    }

    /// Retunes the open database and rewrites its file.
    pub fn optimize(&self, tuning: &HdbTuning) -> Result<()> {
        let (bnum, apow, fpow, opts) = tuning.raw();
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdboptimize(raw, bnum, apow, fpow, opts) });
        self.check(ok, "tchdboptimize")
    }

    /// Removes every record.
    pub fn vanish(&self) -> Result<()> {
        self.unit("tchdbvanish", cabinet_sys::tchdbvanish)
    }

    /// Writes a copy of the database to `path`.
    pub fn copy(&self, path: impl AsRef<Path>) -> Result<()> {
        let cpath = path_to_cstring(path.as_ref(), "tchdbcopy")?;
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tchdbcopy(raw, cpath.as_ptr()) });
        self.check(ok, "tchdbcopy")
    }

    /// Begins a transaction.
    pub fn tranbegin(&self) -> Result<()> {
        self.unit("tchdbtranbegin", cabinet_sys::tchdbtranbegin)
    }

    /// Commits the open transaction.
    pub fn trancommit(&self) -> Result<()> {
        self.unit("tchdbtrancommit", cabinet_sys::tchdbtrancommit)
    }

    /// Aborts the open transaction.
    pub fn tranabort(&self) -> Result<()> {
        self.unit("tchdbtranabort", cabinet_sys::tchdbtranabort)
    }

    /// The file path of the open database.
    pub fn path(&self) -> Result<String> {
        let raw = self.raw();
        let lifecycle = &self.lifecycle;
        let path = released(|| {
            let _open = lifecycle.read();
            let ptr = unsafe { cabinet_sys::tchdbpath(raw) };
            (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        });
        path.ok_or_else(|| self.error("tchdbpath"))
    }

    /// Number of records.
    pub fn rnum(&self) -> Result<u64> {
        if !self.is_open() {
            return Err(Error::engine(cabinet_sys::TCEINVALID, "tchdbrnum"));
        }
        let raw = self.raw();
        Ok(released(|| unsafe { cabinet_sys::tchdbrnum(raw) }))
    }

    /// Size of the database file in bytes.
    pub fn fsiz(&self) -> Result<u64> {
        if !self.is_open() {
            return Err(Error::engine(cabinet_sys::TCEINVALID, "tchdbfsiz"));
        }
        let raw = self.raw();
        Ok(released(|| unsafe { cabinet_sys::tchdbfsiz(raw) }))
    }
}

impl Drop for Hdb {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let raw = self.raw();
            if !released(|| unsafe { cabinet_sys::tchdbclose(raw) }) {
                tracing::warn!(error = %self.error("tchdbclose"), "failed to close hash database on drop");
            }
        }
        let raw = self.raw();
        released(|| unsafe { cabinet_sys::tchdbdel(raw) });
        tracing::debug!("hash handle destroyed");
    }
}

impl std::fmt::Debug for Hdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hdb").field("open", &self.is_open()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn open_hdb(dir: &TempDir) -> Hdb {
        let db = Hdb::new().unwrap();
        db.open(dir.path().join("test.tch"), OpenMode::WRITE_CREATE).unwrap();
        db
    }

    #[test]
    fn put_variants() {
        let dir = TempDir::new().unwrap();
        let db = open_hdb(&dir);
        db.put(b"k", b"v1").unwrap();
        db.put(b"k", b"v2").unwrap();
        assert_eq!(db.putkeep(b"k", b"x").unwrap_err().kind, ErrorKind::Keep);
        db.putcat(b"k", b"+").unwrap();
        assert_eq!(&*db.get(b"k").unwrap(), b"v2+");
        assert_eq!(db.vsiz(b"k").unwrap(), 3);
        db.out(b"k").unwrap();
        assert!(db.get(b"k").unwrap_err().is_not_found());
    }

    #[test]
    fn iterates_every_record() {
        let dir = TempDir::new().unwrap();
        let db = open_hdb(&dir);
        for i in 0..5u8 {
            db.put(&[b'k', i], &[i]).unwrap();
        }
        db.iterinit().unwrap();
        let mut seen = BTreeMap::new();
        while let Some((k, v)) = db.iternext().unwrap() {
            seen.insert(k.to_vec(), v.to_vec());
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[&vec![b'k', 3]], vec![3]);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.tch");
        {
            let db = Hdb::new().unwrap();
            db.open(&path, OpenMode::WRITE_CREATE).unwrap();
            db.put(b"durable", b"yes").unwrap();
        }
        let db = Hdb::new().unwrap();
        db.open(&path, &[]).unwrap();
        assert_eq!(&*db.get(b"durable").unwrap(), b"yes");
        assert_eq!(db.put(b"x", b"y").unwrap_err().kind, ErrorKind::Invalid);
    }

    #[test]
    fn counters() {
        let dir = TempDir::new().unwrap();
        let db = open_hdb(&dir);
        assert_eq!(db.addint(b"n", 7).unwrap(), 7);
        assert_eq!(db.addint(b"n", -2).unwrap(), 5);
        assert_eq!(db.adddouble(b"f", 0.5).unwrap(), 0.5);
        assert!(db.addint(b"f", 1).is_err());
    }

    #[test]
    fn tune_then_optimize() {
        let dir = TempDir::new().unwrap();
        let db = Hdb::new().unwrap();
        db.tune(&HdbTuning::new().bnum(4096).apow(4)).unwrap();
        db.set_cache(Some(128)).unwrap();
        db.open(dir.path().join("tuned.tch"), OpenMode::WRITE_CREATE).unwrap();
        db.put(b"a", b"1").unwrap();
        db.optimize(&HdbTuning::new()).unwrap();
        assert_eq!(db.rnum().unwrap(), 1);
        assert_eq!(db.set_cache(None).unwrap_err().kind, ErrorKind::Invalid);
    }

    #[test]
    fn copy_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let db = open_hdb(&dir);
        db.put(b"a", b"1").unwrap();
        let dest = dir.path().join("copy.tch");
        db.copy(&dest).unwrap();

        let copy = Hdb::new().unwrap();
        copy.open(&dest, &[OpenMode::Reader]).unwrap();
        assert_eq!(&*copy.get(b"a").unwrap(), b"1");
    }
}
