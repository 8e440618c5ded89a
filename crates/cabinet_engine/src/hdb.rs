//! Hash database.

use crate::alloc::{borrow, copy_out};
use crate::ecode::*;
use crate::file::{DbFile, FileKind};
use crate::list::TCLIST;
use crate::store::{self, add_double, add_int, merge, Opened, PutMode, Record, Records};
use crate::OPTS_UNCHANGED;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void};
use std::ptr;

/// A hash database handle.
///
/// Create with [`tchdbnew`], release with [`tchdbdel`].
pub struct TCHDB {
    state: Mutex<HdbState>,
    ecode: Ecode,
}

#[derive(Debug, Default)]
struct HdbState {
    tuning: HashTuning,
    rcnum: i32,
    xmsiz: i64,
    dfunit: i32,
    db: Option<Opened<HashRecords>>,
    iter: Option<HashIter>,
}

#[derive(Debug, Clone, Copy)]
struct HashTuning {
    bnum: i64,
    apow: i8,
    fpow: i8,
    opts: u8,
}

impl Default for HashTuning {
    fn default() -> Self {
        Self {
            bnum: 131_071,
            apow: 4,
            fpow: 10,
            opts: 0,
        }
    }
}

impl HashTuning {
    fn apply(&mut self, bnum: i64, apow: i8, fpow: i8, opts: u8) {
        if bnum > 0 {
            self.bnum = bnum;
        }
        if apow >= 0 {
            self.apow = apow;
        }
        if fpow >= 0 {
            self.fpow = fpow;
        }
        if opts != OPTS_UNCHANGED {
            self.opts = opts;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct HashRecords {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl Records for HashRecords {
    const KIND: FileKind = FileKind::Hash;

    fn snapshot(&self) -> Cow<'_, [Record]> {
        Cow::Owned(
            self.map
                .iter()
                .map(|(key, val)| Record {
                    key: key.clone(),
                    vals: vec![val.clone()],
                })
                .collect(),
        )
    }

    fn rnum(&self) -> u64 {
        self.map.len() as u64
    }
}

#[derive(Debug)]
struct HashIter {
    keys: Vec<Vec<u8>>,
    pos: usize,
}

impl TCHDB {
    fn run<T>(&self, fail: T, f: impl FnOnce(&mut HdbState) -> Result<T, c_int>) -> T {
        let mut state = self.state.lock();
        match f(&mut state) {
            Ok(v) => v,
            Err(ecode) => {
                self.ecode.set(ecode);
                fail
            }
        }
    }

    fn with_open<T>(&self, fail: T, f: impl FnOnce(&mut Opened<HashRecords>) -> Result<T, c_int>) -> T {
        self.run(fail, |state| f(state.db.as_mut().ok_or(TCEINVALID)?))
    }

    fn with_writer<T>(&self, fail: T, f: impl FnOnce(&mut HashRecords) -> Result<T, c_int>) -> T {
        self.with_open(fail, |db| {
            db.require_writer()?;
            f(&mut db.recs)
        })
    }

    fn with_closed(&self, f: impl FnOnce(&mut HdbState)) -> bool {
        self.run(false, |state| {
            if state.db.is_some() {
                return Err(TCEINVALID);
            }
            f(state);
            Ok(true)
        })
    }

    fn put(&self, key: &[u8], val: &[u8], mode: PutMode) -> bool {
        self.with_writer(false, |recs| {
            match recs.map.get_mut(key) {
                Some(existing) => merge(existing, val, mode)?,
                None => {
                    recs.map.insert(key.to_vec(), val.to_vec());
                }
            }
            Ok(true)
        })
    }

    /// Opens an on-memory database.
    pub(crate) fn open_memory(&self) -> bool {
        self.run(false, |state| {
            if state.db.is_some() {
                return Err(TCEINVALID);
            }
            state.db = Some(Opened::memory());
            Ok(true)
        })
    }
}

unsafe fn handle<'a>(hdb: *mut TCHDB) -> Option<&'a TCHDB> {
    hdb.cast_const().as_ref()
}

/// Creates a hash database handle.
#[no_mangle]
pub extern "C" fn tchdbnew() -> *mut TCHDB {
    Box::into_raw(Box::new(TCHDB {
        state: Mutex::new(HdbState::default()),
        ecode: Ecode::default(),
    }))
}

/// Deletes a hash database handle, closing it first if open.
///
/// # Safety
///
/// `hdb` must be null or a handle from [`tchdbnew`] that is not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn tchdbdel(hdb: *mut TCHDB) {
    if hdb.is_null() {
        return;
    }
    let hdb = Box::from_raw(hdb);
    if let Some(db) = hdb.state.lock().db.take() {
        let _ = db.close();
    };
}

/// Returns the last error code of a handle.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbecode(hdb: *mut TCHDB) -> c_int {
    handle(hdb).map_or(TCEINVALID, |h| h.ecode.get())
}

/// Enables the internal mutex and per-thread error codes. Must be called
/// before opening.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbsetmutex(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_closed(|_| h.ecode.make_per_thread())
}

/// Sets tuning parameters. Negative values and `0xff` options keep defaults.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbtune(hdb: *mut TCHDB, bnum: i64, apow: i8, fpow: i8, opts: u8) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_closed(|state| state.tuning.apply(bnum, apow, fpow, opts))
}

/// Sets the record cache size.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbsetcache(hdb: *mut TCHDB, rcnum: i32) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_closed(|state| state.rcnum = rcnum.max(0))
}

/// Sets the extra mapped memory size.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbsetxmsiz(hdb: *mut TCHDB, xmsiz: i64) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_closed(|state| state.xmsiz = xmsiz.max(0))
}

/// Sets the auto defragmentation unit.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbsetdfunit(hdb: *mut TCHDB, dfunit: i32) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_closed(|state| state.dfunit = dfunit.max(0))
}

/// Opens a database file.
///
/// # Safety
///
/// `hdb` must be a valid handle; `path` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tchdbopen(hdb: *mut TCHDB, path: *const c_char, omode: c_int) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.run(false, |state| {
        if state.db.is_some() {
            return Err(TCEINVALID);
        }
        let (path, cpath) = store::path_arg(path)?;
        let (file, records, opts) = DbFile::open(path, omode, FileKind::Hash)?;
        let map = records
            .into_iter()
            .filter_map(|r| r.vals.into_iter().next().map(|v| (r.key, v)))
            .collect();
        let opts = if opts != 0 { opts } else { state.tuning.opts };
        state.db = Some(Opened::file(cpath, file, HashRecords { map }, opts));
        state.iter = None;
        Ok(true)
    })
}

/// Closes a database, writing its records out.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbclose(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.run(false, |state| {
        let db = state.db.take().ok_or(TCEINVALID)?;
        state.iter = None;
        db.close().map_err(|_| TCECLOSE)?;
        Ok(true)
    })
}

/// Stores a record, overwriting any existing value.
///
/// # Safety
///
/// `hdb` must be a valid handle; buffers must be readable for their sizes.
#[no_mangle]
pub unsafe extern "C" fn tchdbput(
    hdb: *mut TCHDB,
    kbuf: *const c_void,
    ksiz: c_int,
    vbuf: *const c_void,
    vsiz: c_int,
) -> bool {
    handle(hdb).is_some_and(|h| h.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), PutMode::Over))
}

/// Stores a record unless the key exists (`TCEKEEP`).
///
/// # Safety
///
/// `hdb` must be a valid handle; buffers must be readable for their sizes.
#[no_mangle]
pub unsafe extern "C" fn tchdbputkeep(
    hdb: *mut TCHDB,
    kbuf: *const c_void,
    ksiz: c_int,
    vbuf: *const c_void,
    vsiz: c_int,
) -> bool {
    handle(hdb).is_some_and(|h| h.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), PutMode::Keep))
}

/// Appends to the value of a record, creating it if missing.
///
/// # Safety
///
/// `hdb` must be a valid handle; buffers must be readable for their sizes.
#[no_mangle]
pub unsafe extern "C" fn tchdbputcat(
    hdb: *mut TCHDB,
    kbuf: *const c_void,
    ksiz: c_int,
    vbuf: *const c_void,
    vsiz: c_int,
) -> bool {
    handle(hdb).is_some_and(|h| h.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), PutMode::Cat))
}

/// Removes a record.
///
/// # Safety
///
/// `hdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tchdbout(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int) -> bool {
    let Some(h) = handle(hdb) else { return false };
    let key = borrow(kbuf, ksiz);
    h.with_writer(false, |recs| recs.map.remove(key).map(|_| true).ok_or(TCENOREC))
}

/// Retrieves a record. The result must be released with [`crate::tcfree`].
///
/// # Safety
///
/// `hdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes;
/// `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tchdbget(
    hdb: *mut TCHDB,
    kbuf: *const c_void,
    ksiz: c_int,
    sp: *mut c_int,
) -> *mut c_void {
    let Some(h) = handle(hdb) else { return ptr::null_mut() };
    let key = borrow(kbuf, ksiz);
    h.with_open(ptr::null_mut(), |db| {
        let val = db.recs.map.get(key).ok_or(TCENOREC)?;
        Ok(copy_out(val, sp))
    })
}

/// Returns the size of a record's value, or -1.
///
/// # Safety
///
/// `hdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tchdbvsiz(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int) -> c_int {
    let Some(h) = handle(hdb) else { return -1 };
    let key = borrow(kbuf, ksiz);
    h.with_open(-1, |db| {
        let val = db.recs.map.get(key).ok_or(TCENOREC)?;
        Ok(val.len() as c_int)
    })
}

/// Initializes the key iterator.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbiterinit(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.run(false, |state| {
        let db = state.db.as_ref().ok_or(TCEINVALID)?;
        let keys = db.recs.map.keys().cloned().collect();
        state.iter = Some(HashIter { keys, pos: 0 });
        Ok(true)
    })
}

/// Returns the next key of the iterator, or null with `TCENOREC` at the end.
///
/// The result must be released with [`crate::tcfree`].
///
/// # Safety
///
/// `hdb` must be a valid handle; `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tchdbiternext(hdb: *mut TCHDB, sp: *mut c_int) -> *mut c_void {
    let Some(h) = handle(hdb) else { return ptr::null_mut() };
    h.run(ptr::null_mut(), |state| {
        let db = state.db.as_ref().ok_or(TCEINVALID)?;
        let iter = state.iter.as_mut().ok_or(TCENOREC)?;
        while let Some(key) = iter.keys.get(iter.pos) {
            iter.pos += 1;
            if db.recs.map.contains_key(key) {
                return Ok(copy_out(key, sp));
            }
        }
        Err(TCENOREC)
    })
}

/// Lists keys starting with a prefix, at most `max` of them (negative for all).
///
/// # Safety
///
/// `hdb` must be a valid handle; `pbuf` must be readable for `psiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tchdbfwmkeys(
    hdb: *mut TCHDB,
    pbuf: *const c_void,
    psiz: c_int,
    max: c_int,
) -> *mut TCLIST {
    let Some(h) = handle(hdb) else { return ptr::null_mut() };
    let prefix = borrow(pbuf, psiz);
    let limit = usize::try_from(max).unwrap_or(usize::MAX);
    h.with_open(ptr::null_mut(), |db| {
        let keys = db
            .recs
            .map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect();
        Ok(TCLIST::into_raw(keys))
    })
}

/// Adds to an integer record. Returns `i32::MIN` on failure.
///
/// # Safety
///
/// `hdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tchdbaddint(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, num: c_int) -> c_int {
    let Some(h) = handle(hdb) else { return c_int::MIN };
    let key = borrow(kbuf, ksiz);
    h.with_writer(c_int::MIN, |recs| {
        let sum = add_int(recs.map.get(key).map(Vec::as_slice), num)?;
        recs.map.insert(key.to_vec(), sum.to_ne_bytes().to_vec());
        Ok(sum)
    })
}

/// Adds to a real-number record. Returns NaN on failure.
///
/// # Safety
///
/// `hdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tchdbadddouble(hdb: *mut TCHDB, kbuf: *const c_void, ksiz: c_int, num: f64) -> f64 {
    let Some(h) = handle(hdb) else { return f64::NAN };
    let key = borrow(kbuf, ksiz);
    h.with_writer(f64::NAN, |recs| {
        let sum = add_double(recs.map.get(key).map(Vec::as_slice), num)?;
        recs.map.insert(key.to_vec(), sum.to_ne_bytes().to_vec());
        Ok(sum)
    })
}

/// Writes all records to the disk.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbsync(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_open(false, |db| db.sync().map(|_| true))
}

/// Retunes an open database and rewrites its file.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdboptimize(hdb: *mut TCHDB, bnum: i64, apow: i8, fpow: i8, opts: u8) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.run(false, |state| {
        let db = state.db.as_mut().ok_or(TCEINVALID)?;
        db.require_writer()?;
        state.tuning.apply(bnum, apow, fpow, opts);
        db.opts = state.tuning.opts;
        db.flush()?;
        Ok(true)
    })
}

/// Removes every record.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbvanish(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_writer(false, |recs| {
        recs.map.clear();
        Ok(true)
    })
}

/// Writes a copy of the database to another file.
///
/// # Safety
///
/// `hdb` must be a valid handle; `path` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tchdbcopy(hdb: *mut TCHDB, path: *const c_char) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_open(false, |db| {
        let (path, _) = store::path_arg(path)?;
        db.copy(path).map(|_| true)
    })
}

/// Begins a transaction.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbtranbegin(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_open(false, |db| db.begin().map(|_| true))
}

/// Commits the open transaction.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbtrancommit(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_open(false, |db| db.commit().map(|_| true))
}

/// Aborts the open transaction.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbtranabort(hdb: *mut TCHDB) -> bool {
    let Some(h) = handle(hdb) else { return false };
    h.with_open(false, |db| db.abort().map(|_| true))
}

/// Returns the file path of an open database.
///
/// The string is owned by the handle and valid until it is closed.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbpath(hdb: *mut TCHDB) -> *const c_char {
    let Some(h) = handle(hdb) else { return ptr::null() };
    h.with_open(ptr::null(), |db| db.path().map(|p| p.as_ptr()).ok_or(TCEINVALID))
}

/// Returns the number of records, or 0 on failure.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbrnum(hdb: *mut TCHDB) -> u64 {
    let Some(h) = handle(hdb) else { return 0 };
    h.with_open(0, |db| Ok(db.recs.rnum()))
}

/// Returns the size of the database file, or 0 on failure.
///
/// # Safety
///
/// `hdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tchdbfsiz(hdb: *mut TCHDB) -> u64 {
    let Some(h) = handle(hdb) else { return 0 };
    h.with_open(0, |db| db.fsiz())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tcfree, tclistdel, tclistnum, HDBOCREAT, HDBOREADER, HDBOWRITER};
    use std::ffi::CString;
    use tempfile::TempDir;

    unsafe fn put(h: *mut TCHDB, k: &[u8], v: &[u8]) -> bool {
        tchdbput(h, k.as_ptr().cast(), k.len() as c_int, v.as_ptr().cast(), v.len() as c_int)
    }

    unsafe fn get(h: *mut TCHDB, k: &[u8]) -> Option<Vec<u8>> {
        let mut len = 0;
        let val = tchdbget(h, k.as_ptr().cast(), k.len() as c_int, &mut len);
        if val.is_null() {
            return None;
        }
        let out = borrow(val, len).to_vec();
        tcfree(val);
        Some(out)
    }

    #[test]
    fn operations_require_open() {
        unsafe {
            let h = tchdbnew();
            assert!(!put(h, b"k", b"v"));
            assert_eq!(tchdbecode(h), TCEINVALID);
            tchdbdel(h);
        }
    }

    #[test]
    fn put_get_out_on_file() {
        let dir = TempDir::new().unwrap();
        let path = CString::new(dir.path().join("db.tch").to_str().unwrap()).unwrap();

        unsafe {
            let h = tchdbnew();
            assert!(tchdbopen(h, path.as_ptr(), HDBOWRITER | HDBOCREAT));
            assert!(put(h, b"a\0b", b"1"));
            assert!(!tchdbputkeep(h, b"a\0b".as_ptr().cast(), 3, b"2".as_ptr().cast(), 1));
            assert_eq!(tchdbecode(h), TCEKEEP);
            assert!(tchdbputcat(h, b"a\0b".as_ptr().cast(), 3, b"2".as_ptr().cast(), 1));
            assert_eq!(get(h, b"a\0b").as_deref(), Some(&b"12"[..]));
            assert!(tchdbout(h, b"a\0b".as_ptr().cast(), 3));
            assert_eq!(get(h, b"a\0b"), None);
            assert_eq!(tchdbecode(h), TCENOREC);
            assert!(put(h, b"kept", b"yes"));
            assert!(tchdbclose(h));

            assert!(tchdbopen(h, path.as_ptr(), HDBOREADER));
            assert_eq!(get(h, b"kept").as_deref(), Some(&b"yes"[..]));
            assert!(!put(h, b"x", b"y"));
            assert_eq!(tchdbecode(h), TCEINVALID);
            tchdbdel(h);
        }
    }

    #[test]
    fn iterator_and_prefix() {
        unsafe {
            let h = tchdbnew();
            assert!(h.as_ref().unwrap().open_memory());
            for k in [&b"ab1"[..], b"ab2", b"zz"] {
                assert!(put(h, k, b"v"));
            }

            let list = tchdbfwmkeys(h, b"ab".as_ptr().cast(), 2, -1);
            assert_eq!(tclistnum(list), 2);
            tclistdel(list);

            assert!(tchdbiterinit(h));
            let mut seen = 0;
            loop {
                let mut len = 0;
                let key = tchdbiternext(h, &mut len);
                if key.is_null() {
                    break;
                }
                tcfree(key);
                seen += 1;
            }
            assert_eq!(seen, 3);
            assert_eq!(tchdbecode(h), TCENOREC);
            tchdbdel(h);
        }
    }

    #[test]
    fn addint_on_foreign_value_fails() {
        unsafe {
            let h = tchdbnew();
            assert!(h.as_ref().unwrap().open_memory());
            assert_eq!(tchdbaddint(h, b"n".as_ptr().cast(), 1, 5), 5);
            assert_eq!(tchdbaddint(h, b"n".as_ptr().cast(), 1, 2), 7);
            assert!(put(h, b"s", b"not a number"));
            assert_eq!(tchdbaddint(h, b"s".as_ptr().cast(), 1, 1), c_int::MIN);
            assert_eq!(tchdbecode(h), TCEKEEP);
            assert!(tchdbadddouble(h, b"s".as_ptr().cast(), 1, 1.0).is_nan());
            tchdbdel(h);
        }
    }

    #[test]
    fn transaction_abort_restores() {
        unsafe {
            let h = tchdbnew();
            assert!(h.as_ref().unwrap().open_memory());
            assert!(put(h, b"a", b"1"));
            assert!(tchdbtranbegin(h));
            assert!(put(h, b"b", b"2"));
            assert!(tchdbtranabort(h));
            assert_eq!(tchdbrnum(h), 1);
            assert!(!tchdbtrancommit(h));
            tchdbdel(h);
        }
    }

    #[test]
    fn tuning_rejected_while_open() {
        unsafe {
            let h = tchdbnew();
            assert!(tchdbtune(h, 1024, -1, -1, OPTS_UNCHANGED));
            assert!(h.as_ref().unwrap().open_memory());
            assert!(!tchdbtune(h, 1024, -1, -1, OPTS_UNCHANGED));
            assert_eq!(tchdbecode(h), TCEINVALID);
            tchdbdel(h);
        }
    }
}
