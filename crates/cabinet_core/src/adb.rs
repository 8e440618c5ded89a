//! Abstract database handles.
//!
//! The engine keeps no error code for abstract databases, so every failure
//! is reported as [`ErrorKind::Misc`](crate::ErrorKind::Misc), missing
//! records included.

use crate::bdb::limit;
use crate::buffer::{c_buf, NativeBuf};
use crate::error::{Error, Result};
use crate::list::List;
use crate::path_to_cstring;
use crate::permit::released;
use cabinet_sys::TCADB;
use std::cell::Cell;
use std::ffi::{c_int, CStr, CString};
use std::path::Path;
use std::ptr::{self, NonNull};

/// An abstract database handle.
///
/// The concrete database is picked by the name given to [`Adb::open`]:
///
/// | name        | database                 |
/// |-------------|--------------------------|
/// | `*`         | on-memory hash           |
/// | `+`         | on-memory B-tree         |
/// | `*.tch`     | hash database file       |
/// | `*.tcb`     | B-tree database file     |
///
/// Tuning follows the name as `#name=value` pairs, e.g.
/// `casket.tcb#mode=wc#lmemb=64#opts=ld`.
///
/// ```
/// use cabinet_core::Adb;
///
/// let db = Adb::new()?;
/// db.open("+")?;
/// db.put(b"apple", b"red")?;
/// db.put(b"banana", b"yellow")?;
/// assert_eq!(db.fwmkeys(b"b", None)?.to_vec(), vec![b"banana".to_vec()]);
/// # Ok::<(), cabinet_core::Error>(())
/// ```
pub struct Adb {
    raw: NonNull<TCADB>,
    open: Cell<bool>,
}

// The handle owns its engine instance outright.
unsafe impl Send for Adb {}

fn misc(function: &'static str) -> Error {
    Error::engine(cabinet_sys::TCEMISC, function)
}

fn check(ok: bool, function: &'static str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(misc(function))
    }
}

impl Adb {
    /// Creates a closed handle.
    pub fn new() -> Result<Self> {
        let raw = NonNull::new(cabinet_sys::tcadbnew())
            .ok_or_else(|| Error::binding("tcadbnew", "failed to allocate an abstract handle"))?;
        Ok(Self {
            raw,
            open: Cell::new(false),
        })
    }

    fn raw(&self) -> *mut TCADB {
        self.raw.as_ptr()
    }

    /// Returns true while a database is open.
    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Opens a database by name.
    pub fn open(&self, name: &str) -> Result<()> {
        let cname = CString::new(name).map_err(|_| Error::binding("tcadbopen", "name contains a NUL byte"))?;
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcadbopen(raw, cname.as_ptr()) });
        check(ok, "tcadbopen")?;
        self.open.set(true);
        tracing::debug!(name, "opened abstract database");
        Ok(())
    }

    /// Closes the database.
    pub fn close(&self) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcadbclose(raw) });
        if self.open.replace(false) {
            tracing::debug!("closed abstract database");
        }
        check(ok, "tcadbclose")
    }

    fn put_with(
        &self,
        key: &[u8],
        value: &[u8],
        function: &'static str,
        native: unsafe extern "C" fn(*mut TCADB, *const std::ffi::c_void, c_int, *const std::ffi::c_void, c_int) -> bool,
    ) -> Result<()> {
        let (kbuf, ksiz) = c_buf(key, function)?;
        let (vbuf, vsiz) = c_buf(value, function)?;
        let raw = self.raw();
        let ok = released(|| unsafe { native(raw, kbuf, ksiz, vbuf, vsiz) });
        check(ok, function)
    }

    /// Stores a record, overwriting any existing value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, "tcadbput", cabinet_sys::tcadbput)
    }

    /// Stores a record unless the key exists.
    pub fn putkeep(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, "tcadbputkeep", cabinet_sys::tcadbputkeep)
    }

    /// Appends to a record's value, creating it if missing.
    pub fn putcat(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, "tcadbputcat", cabinet_sys::tcadbputcat)
    }

    /// Removes a record.
    pub fn out(&self, key: &[u8]) -> Result<()> {
        let (kbuf, ksiz) = c_buf(key, "tcadbout")?;
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcadbout(raw, kbuf, ksiz) });
        check(ok, "tcadbout")
    }

    /// Retrieves a record's value.
    pub fn get(&self, key: &[u8]) -> Result<NativeBuf> {
        let (kbuf, ksiz) = c_buf(key, "tcadbget")?;
        let raw = self.raw();
        let mut len: c_int = 0;
        let ptr = released(|| unsafe { cabinet_sys::tcadbget(raw, kbuf, ksiz, &mut len) });
        unsafe { NativeBuf::from_raw(ptr, len) }.ok_or_else(|| misc("tcadbget"))
    }

    /// Size of a record's value.
    pub fn vsiz(&self, key: &[u8]) -> Result<usize> {
        let (kbuf, ksiz) = c_buf(key, "tcadbvsiz")?;
        let raw = self.raw();
        let n = released(|| unsafe { cabinet_sys::tcadbvsiz(raw, kbuf, ksiz) });
        usize::try_from(n).map_err(|_| misc("tcadbvsiz"))
    }

    /// Resets the record iterator.
    pub fn iterinit(&self) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcadbiterinit(raw) });
        check(ok, "tcadbiterinit")
    }

    /// Returns the next record of the iterator, or `None` past the last one.
    ///
    /// The engine reports no cause for a missing key, so a failure inside
    /// the engine while open also ends the iteration with `None`.
    pub fn iternext(&self) -> Result<Option<(NativeBuf, NativeBuf)>> {
        if !self.is_open() {
            return Err(misc("tcadbiternext"));
        }
        let raw = self.raw();
        let mut len: c_int = 0;
        let kptr = released(|| unsafe { cabinet_sys::tcadbiternext(raw, &mut len) });
        let Some(key) = (unsafe { NativeBuf::from_raw(kptr, len) }) else {
            return Ok(None);
        };
        let value = self.get(&key)?;
        Ok(Some((key, value)))
    }

    /// Lists keys starting with `prefix`, at most `max` of them.
    pub fn fwmkeys(&self, prefix: &[u8], max: Option<usize>) -> Result<List> {
        let (pbuf, psiz) = c_buf(prefix, "tcadbfwmkeys")?;
        let max = limit(max);
        let raw = self.raw();
        let list = released(|| unsafe { cabinet_sys::tcadbfwmkeys(raw, pbuf, psiz, max) });
        unsafe { List::from_raw(list) }.ok_or_else(|| misc("tcadbfwmkeys"))
    }

    /// Adds to an integer record and returns the new value.
    pub fn addint(&self, key: &[u8], delta: i32) -> Result<i32> {
        let (kbuf, ksiz) = c_buf(key, "tcadbaddint")?;
        let raw = self.raw();
        let sum = released(|| unsafe { cabinet_sys::tcadbaddint(raw, kbuf, ksiz, delta) });
        if sum == i32::MIN {
            return Err(misc("tcadbaddint"));
        }
        Ok(sum)
    }

    /// Adds to a real-number record and returns the new value.
    pub fn adddouble(&self, key: &[u8], delta: f64) -> Result<f64> {
        let (kbuf, ksiz) = c_buf(key, "tcadbadddouble")?;
        let raw = self.raw();
        let sum = released(|| unsafe { cabinet_sys::tcadbadddouble(raw, kbuf, ksiz, delta) });
        if sum.is_nan() {
            return Err(misc("tcadbadddouble"));
        }
        Ok(sum)
    }

    fn unit(&self, function: &'static str, native: unsafe extern "C" fn(*mut TCADB) -> bool) -> Result<()> {
        let raw = self.raw();
        let ok = released(|| unsafe { native(raw) });
        check(ok, function)
    }

    /// Writes all records to the disk. A no-op for on-memory databases.
    pub fn sync(&self) -> Result<()> {
        self.unit("tcadbsync", cabinet_sys::tcadbsync)
    }

    /// Retunes the database with `#name=value` parameters, or with the
    /// current ones when `params` is `None`.
    pub fn optimize(&self, params: Option<&str>) -> Result<()> {
        let params = params
            .map(|p| CString::new(p).map_err(|_| Error::binding("tcadboptimize", "params contain a NUL byte")))
            .transpose()?;
        let pptr = params.as_ref().map_or(ptr::null(), |p| p.as_ptr());
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcadboptimize(raw, pptr) });
        check(ok, "tcadboptimize")
    }

    /// Removes every record.
    pub fn vanish(&self) -> Result<()> {
        self.unit("tcadbvanish", cabinet_sys::tcadbvanish)
    }

    /// Writes a copy of the database to `path`.
    pub fn copy(&self, path: impl AsRef<Path>) -> Result<()> {
        let cpath = path_to_cstring(path.as_ref(), "tcadbcopy")?;
        let raw = self.raw();
        let ok = released(|| unsafe { cabinet_sys::tcadbcopy(raw, cpath.as_ptr()) });
        check(ok, "tcadbcopy")
    }

    /// Begins a transaction.
    pub fn tranbegin(&self) -> Result<()> {
        self.unit("tcadbtranbegin", cabinet_sys::tcadbtranbegin)
    }

    /// Commits the open transaction.
    pub fn trancommit(&self) -> Result<()> {
        self.unit("tcadbtrancommit", cabinet_sys::tcadbtrancommit)
    }

    /// Aborts the open transaction.
    pub fn tranabort(&self) -> Result<()> {
        self.unit("tcadbtranabort", cabinet_sys::tcadbtranabort)
    }

    /// The path the database was opened with; `*` or `+` on memory.
    pub fn path(&self) -> Result<String> {
        let raw = self.raw();
        let path = released(|| {
            let ptr = unsafe { cabinet_sys::tcadbpath(raw) };
            (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        });
        path.ok_or_else(|| misc("tcadbpath"))
    }

    /// Number of records.
    pub fn rnum(&self) -> Result<u64> {
        if !self.is_open() {
            return Err(misc("tcadbrnum"));
        }
        let raw = self.raw();
        Ok(released(|| unsafe { cabinet_sys::tcadbrnum(raw) }))
    }

    /// Size of the database in bytes.
    pub fn size(&self) -> Result<u64> {
        if !self.is_open() {
            return Err(misc("tcadbsize"));
        }
        let raw = self.raw();
        Ok(released(|| unsafe { cabinet_sys::tcadbsize(raw) }))
    }

    /// Runs a named engine command.
    ///
    /// `args` is passed through as is and the results come back in engine
    /// order. Fails when the command fails or is unknown.
    pub fn misc(&self, name: &str, args: &List) -> Result<List> {
        let cname = CString::new(name).map_err(|_| Error::binding("tcadbmisc", "name contains a NUL byte"))?;
        let raw = self.raw();
        let argv = args.as_ptr();
        let list = released(|| unsafe { cabinet_sys::tcadbmisc(raw, cname.as_ptr(), argv) });
        unsafe { List::from_raw(list) }.ok_or_else(|| misc("tcadbmisc"))
    }
}

impl Drop for Adb {
    fn drop(&mut self) {
        if self.open.replace(false) {
            let raw = self.raw();
            if !released(|| unsafe { cabinet_sys::tcadbclose(raw) }) {
                tracing::warn!("failed to close abstract database on drop");
            }
        }
        let raw = self.raw();
        released(|| unsafe { cabinet_sys::tcadbdel(raw) });
        tracing::debug!("abstract handle destroyed");
    }
}

impl std::fmt::Debug for Adb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adb").field("open", &self.is_open()).finish()
    }
}
