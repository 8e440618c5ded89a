//! Abstract database.
//!
//! A `TCADB` picks its concrete database from the name it is opened with:
//!
//! - `*` opens an on-memory hash database
//! - `+` opens an on-memory B-tree database
//! - a path ending in `.tch` opens a hash database file
//! - a path ending in `.tcb` opens a B-tree database file
//!
//! Tuning parameters follow the name as `#key=value` pairs, for example
//! `casket.tcb#mode=wc#lmemb=64#opts=ld`. The abstract API reports failure
//! by its return values only; it keeps no error code.

use crate::alloc::borrow;
use crate::bdb::*;
use crate::hdb::*;
use crate::list::{tclistdel, TCLIST};
use crate::store::PutMode;
use crate::{tcfree, BDBOCREAT, BDBOLCKNB, BDBONOLCK, BDBOREADER, BDBOTRUNC, BDBOWRITER, OPTS_UNCHANGED};
use crate::{BDBTBZIP, BDBTDEFLATE, BDBTLARGE, BDBTTCBS};
use parking_lot::Mutex;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

/// An abstract database handle.
///
/// Create with [`tcadbnew`], release with [`tcadbdel`].
pub struct TCADB {
    state: Mutex<Option<Backend>>,
}

// The backend handles are owned exclusively and only used under the lock.
unsafe impl Send for TCADB {}
unsafe impl Sync for TCADB {}

struct Backend {
    name: CString,
    kind: BackendKind,
}

enum BackendKind {
    Hash(*mut TCHDB),
    Tree { bdb: *mut TCBDB, cur: *mut BDBCUR },
}

/// Parameters parsed from an open name or an optimize string.
#[derive(Debug, Clone, PartialEq)]
struct Params {
    mode: c_int,
    bnum: i64,
    apow: i8,
    fpow: i8,
    opts: u8,
    lmemb: i32,
    nmemb: i32,
    rcnum: i32,
    lcnum: i32,
    ncnum: i32,
    xmsiz: i64,
    dfunit: i32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            mode: BDBOWRITER | BDBOCREAT,
            bnum: -1,
            apow: -1,
            fpow: -1,
            opts: OPTS_UNCHANGED,
            lmemb: -1,
            nmemb: -1,
            rcnum: -1,
            lcnum: -1,
            ncnum: -1,
            xmsiz: -1,
            dfunit: -1,
        }
    }
}

impl Params {
    /// Parses `#key=value` pairs. Unknown keys and malformed numbers are
    /// ignored.
    fn parse<'a>(pairs: impl Iterator<Item = &'a str>) -> Self {
        let mut params = Self::default();
        for pair in pairs {
            let Some((key, value)) = pair.split_once('=') else { continue };
            let num = || value.trim().parse::<i64>().ok();
            match key.trim() {
                "mode" => params.mode = parse_mode(value),
                "opts" => params.opts = parse_opts(value),
                "bnum" => params.bnum = num().unwrap_or(-1),
                "apow" => params.apow = num().and_then(|n| i8::try_from(n).ok()).unwrap_or(-1),
                "fpow" => params.fpow = num().and_then(|n| i8::try_from(n).ok()).unwrap_or(-1),
                "lmemb" => params.lmemb = narrow(num()),
                "nmemb" => params.nmemb = narrow(num()),
                "rcnum" => params.rcnum = narrow(num()),
                "lcnum" => params.lcnum = narrow(num()),
                "ncnum" => params.ncnum = narrow(num()),
                "xmsiz" => params.xmsiz = num().unwrap_or(-1),
                "dfunit" => params.dfunit = narrow(num()),
                _ => {}
            }
        }
        params
    }
}

fn narrow(num: Option<i64>) -> i32 {
    num.and_then(|n| i32::try_from(n).ok()).unwrap_or(-1)
}

fn parse_mode(value: &str) -> c_int {
    let mut mode = 0;
    for c in value.chars() {
        mode |= match c.to_ascii_lowercase() {
            'w' => BDBOWRITER,
            'r' => BDBOREADER,
            'c' => BDBOCREAT,
            't' => BDBOTRUNC,
            'e' => BDBONOLCK,
            'f' => BDBOLCKNB,
            _ => 0,
        };
    }
    if mode & (BDBOWRITER | BDBOREADER) == 0 {
        mode |= BDBOREADER;
    }
    mode
}

fn parse_opts(value: &str) -> u8 {
    let mut opts = 0;
    for c in value.chars() {
        opts |= match c.to_ascii_lowercase() {
            'l' => BDBTLARGE,
            'd' => BDBTDEFLATE,
            'b' => BDBTBZIP,
            't' => BDBTTCBS,
            _ => 0,
        };
    }
    opts
}

fn raw(data: &[u8]) -> (*const c_void, c_int) {
    (data.as_ptr().cast(), data.len() as c_int)
}

unsafe fn take(buf: *mut c_void, len: c_int) -> Option<Vec<u8>> {
    if buf.is_null() {
        return None;
    }
    let out = borrow(buf, len).to_vec();
    tcfree(buf);
    Some(out)
}

impl Backend {
    unsafe fn open(name: &str) -> Option<Self> {
        let mut parts = name.split('#');
        let path = parts.next().unwrap_or_default();
        let params = Params::parse(parts);
        let cpath = CString::new(path).ok()?;

        let kind = if path == "*" || path.ends_with(".tch") {
            let hdb = tchdbnew();
            let ok = tchdbsetmutex(hdb)
                && tchdbtune(hdb, params.bnum, params.apow, params.fpow, params.opts)
                && tchdbsetcache(hdb, params.rcnum)
                && tchdbsetxmsiz(hdb, params.xmsiz)
                && tchdbsetdfunit(hdb, params.dfunit);
            let opened = ok
                && if path == "*" {
                    (*hdb).open_memory()
                } else {
                    tchdbopen(hdb, cpath.as_ptr(), params.mode)
                };
            if !opened {
                tchdbdel(hdb);
                return None;
            }
            BackendKind::Hash(hdb)
        } else if path == "+" || path.ends_with(".tcb") {
            let bdb = tcbdbnew();
            let ok = tcbdbsetmutex(bdb)
                && tcbdbtune(
                    bdb,
                    params.lmemb,
                    params.nmemb,
                    params.bnum,
                    params.apow,
                    params.fpow,
                    params.opts,
                )
                && tcbdbsetcache(bdb, params.lcnum, params.ncnum)
                && tcbdbsetxmsiz(bdb, params.xmsiz)
                && tcbdbsetdfunit(bdb, params.dfunit);
            let opened = ok
                && if path == "+" {
                    (*bdb).open_memory()
                } else {
                    tcbdbopen(bdb, cpath.as_ptr(), params.mode)
                };
            if !opened {
                tcbdbdel(bdb);
                return None;
            }
            BackendKind::Tree {
                bdb,
                cur: tcbdbcurnew(bdb),
            }
        } else {
            return None;
        };
        Some(Self { name: cpath, kind })
    }

    unsafe fn close(self) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => {
                let ok = tchdbclose(hdb);
                tchdbdel(hdb);
                ok
            }
            BackendKind::Tree { bdb, cur } => {
                tcbdbcurdel(cur);
                let ok = tcbdbclose(bdb);
                tcbdbdel(bdb);
                ok
            }
        }
    }

    unsafe fn put(&self, key: &[u8], val: &[u8], mode: PutMode) -> bool {
        let ((kp, ks), (vp, vs)) = (raw(key), raw(val));
        match self.kind {
            BackendKind::Hash(hdb) => {
                let put: unsafe extern "C" fn(*mut TCHDB, *const c_void, c_int, *const c_void, c_int) -> bool =
                    match mode {
                        PutMode::Over | PutMode::Dup => tchdbput,
                        PutMode::Keep => tchdbputkeep,
                        PutMode::Cat => tchdbputcat,
                    };
                put(hdb, kp, ks, vp, vs)
            }
            BackendKind::Tree { bdb, .. } => {
                let put: unsafe extern "C" fn(*mut TCBDB, *const c_void, c_int, *const c_void, c_int) -> bool =
                    match mode {
                        PutMode::Over => tcbdbput,
                        PutMode::Keep => tcbdbputkeep,
                        PutMode::Cat => tcbdbputcat,
                        PutMode::Dup => tcbdbputdup,
                    };
                put(bdb, kp, ks, vp, vs)
            }
        }
    }

    unsafe fn out(&self, key: &[u8]) -> bool {
        let (kp, ks) = raw(key);
        match self.kind {
            BackendKind::Hash(hdb) => tchdbout(hdb, kp, ks),
            BackendKind::Tree { bdb, .. } => tcbdbout(bdb, kp, ks),
        }
    }

    unsafe fn get(&self, key: &[u8], sp: *mut c_int) -> *mut c_void {
        let (kp, ks) = raw(key);
        match self.kind {
            BackendKind::Hash(hdb) => tchdbget(hdb, kp, ks, sp),
            BackendKind::Tree { bdb, .. } => tcbdbget(bdb, kp, ks, sp),
        }
    }

    unsafe fn get_vec(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut len = 0;
        take(self.get(key, &mut len), len)
    }

    unsafe fn vsiz(&self, key: &[u8]) -> c_int {
        let (kp, ks) = raw(key);
        match self.kind {
            BackendKind::Hash(hdb) => tchdbvsiz(hdb, kp, ks),
            BackendKind::Tree { bdb, .. } => tcbdbvsiz(bdb, kp, ks),
        }
    }

    unsafe fn iterinit(&self) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbiterinit(hdb),
            BackendKind::Tree { cur, .. } => {
                // An empty tree leaves the cursor unset, which ends iteration.
                tcbdbcurfirst(cur);
                true
            }
        }
    }

    unsafe fn iternext(&self, sp: *mut c_int) -> *mut c_void {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbiternext(hdb, sp),
            BackendKind::Tree { cur, .. } => {
                let key = tcbdbcurkey(cur, sp);
                if !key.is_null() {
                    tcbdbcurnext(cur);
                }
                key
            }
        }
    }

    unsafe fn iternext_vec(&self) -> Option<Vec<u8>> {
        let mut len = 0;
        take(self.iternext(&mut len), len)
    }

    unsafe fn fwmkeys(&self, prefix: &[u8], max: c_int) -> *mut TCLIST {
        let (pp, ps) = raw(prefix);
        match self.kind {
            BackendKind::Hash(hdb) => tchdbfwmkeys(hdb, pp, ps, max),
            BackendKind::Tree { bdb, .. } => tcbdbfwmkeys(bdb, pp, ps, max),
        }
    }

    unsafe fn addint(&self, key: &[u8], num: c_int) -> c_int {
        let (kp, ks) = raw(key);
        match self.kind {
            BackendKind::Hash(hdb) => tchdbaddint(hdb, kp, ks, num),
            BackendKind::Tree { bdb, .. } => tcbdbaddint(bdb, kp, ks, num),
        }
    }

    unsafe fn adddouble(&self, key: &[u8], num: f64) -> f64 {
        let (kp, ks) = raw(key);
        match self.kind {
            BackendKind::Hash(hdb) => tchdbadddouble(hdb, kp, ks, num),
            BackendKind::Tree { bdb, .. } => tcbdbadddouble(bdb, kp, ks, num),
        }
    }

    fn is_memory(&self) -> bool {
        matches!(self.name.to_bytes(), b"*" | b"+")
    }

    unsafe fn sync(&self) -> bool {
        if self.is_memory() {
            return true;
        }
        match self.kind {
            BackendKind::Hash(hdb) => tchdbsync(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbsync(bdb),
        }
    }

    unsafe fn optimize(&self, params: Option<&str>) -> bool {
        let params = Params::parse(params.unwrap_or_default().split('#'));
        match self.kind {
            BackendKind::Hash(hdb) => tchdboptimize(hdb, params.bnum, params.apow, params.fpow, params.opts),
            BackendKind::Tree { bdb, .. } => tcbdboptimize(
                bdb,
                params.lmemb,
                params.nmemb,
                params.bnum,
                params.apow,
                params.fpow,
                params.opts,
            ),
        }
    }

    unsafe fn vanish(&self) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbvanish(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbvanish(bdb),
        }
    }

    unsafe fn copy(&self, path: *const c_char) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbcopy(hdb, path),
            BackendKind::Tree { bdb, .. } => tcbdbcopy(bdb, path),
        }
    }

    unsafe fn tranbegin(&self) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbtranbegin(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbtranbegin(bdb),
        }
    }

    unsafe fn trancommit(&self) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbtrancommit(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbtrancommit(bdb),
        }
    }

    unsafe fn tranabort(&self) -> bool {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbtranabort(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbtranabort(bdb),
        }
    }

    unsafe fn rnum(&self) -> u64 {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbrnum(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbrnum(bdb),
        }
    }

    unsafe fn size(&self) -> u64 {
        match self.kind {
            BackendKind::Hash(hdb) => tchdbfsiz(hdb),
            BackendKind::Tree { bdb, .. } => tcbdbfsiz(bdb),
        }
    }

    /// Runs a named command. Returns `None` when it fails or is unknown.
    unsafe fn misc(&self, name: &str, args: &[Vec<u8>]) -> Option<Vec<Vec<u8>>> {
        let arg = |i: usize| args.get(i).map(Vec::as_slice);
        match name {
            "put" => {
                let (key, val) = (arg(0)?, arg(1)?);
                self.put(key, val, PutMode::Over).then(Vec::new)
            }
            "out" => self.out(arg(0)?).then(Vec::new),
            "get" => self.get_vec(arg(0)?).map(|v| vec![v]),
            "putlist" => {
                let mut ok = true;
                for pair in args.chunks_exact(2) {
                    ok &= self.put(&pair[0], &pair[1], PutMode::Over);
                }
                ok.then(Vec::new)
            }
            "outlist" => {
                let mut ok = true;
                for key in args {
                    ok &= self.out(key);
                }
                ok.then(Vec::new)
            }
            "getlist" => {
                let mut out = Vec::new();
                for key in args {
                    if let Some(val) = self.get_vec(key) {
                        out.push(key.clone());
                        out.push(val);
                    }
                }
                Some(out)
            }
            "iterinit" => match (&self.kind, arg(0)) {
                (BackendKind::Tree { cur, .. }, Some(start)) => {
                    let (kp, ks) = raw(start);
                    tcbdbcurjump(*cur, kp, ks).then(Vec::new)
                }
                _ => self.iterinit().then(Vec::new),
            },
            "iternext" => {
                let key = self.iternext_vec()?;
                let val = self.get_vec(&key)?;
                Some(vec![key, val])
            }
            "sync" => self.sync().then(Vec::new),
            "optimize" => {
                let params = arg(0).and_then(|p| std::str::from_utf8(p).ok());
                self.optimize(params).then(Vec::new)
            }
            "vanish" => self.vanish().then(Vec::new),
            "range" => self.range(arg(0), arg(1), arg(2)),
            _ => None,
        }
    }

    /// Lists key/value pairs from `begin` (inclusive) up to `end`
    /// (exclusive). Only B-trees support it.
    unsafe fn range(&self, begin: Option<&[u8]>, max: Option<&[u8]>, end: Option<&[u8]>) -> Option<Vec<Vec<u8>>> {
        let BackendKind::Tree { bdb, .. } = self.kind else { return None };
        let max = max
            .and_then(|m| std::str::from_utf8(m).ok())
            .and_then(|m| m.trim().parse::<c_int>().ok())
            .unwrap_or(-1);
        let (bp, bs) = begin.map_or((ptr::null(), 0), raw);
        let (ep, es) = end.map_or((ptr::null(), 0), raw);
        let list = tcbdbrange(bdb, bp, bs, true, ep, es, false, max);
        if list.is_null() {
            return None;
        }
        let keys = TCLIST::items(list).to_vec();
        tclistdel(list);

        let mut out = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            if let Some(val) = self.get_vec(&key) {
                out.push(key);
                out.push(val);
            }
        }
        Some(out)
    }
}

impl TCADB {
    fn with<T>(&self, fail: T, f: impl FnOnce(&Backend) -> T) -> T {
        match self.state.lock().as_ref() {
            Some(backend) => f(backend),
            None => fail,
        }
    }
}

unsafe fn handle<'a>(adb: *mut TCADB) -> Option<&'a TCADB> {
    adb.cast_const().as_ref()
}

/// Creates an abstract database handle.
#[no_mangle]
pub extern "C" fn tcadbnew() -> *mut TCADB {
    Box::into_raw(Box::new(TCADB {
        state: Mutex::new(None),
    }))
}

/// Deletes an abstract database handle, closing it first if open.
///
/// # Safety
///
/// `adb` must be null or a handle from [`tcadbnew`] not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn tcadbdel(adb: *mut TCADB) {
    if adb.is_null() {
        return;
    }
    let adb = Box::from_raw(adb);
    if let Some(backend) = adb.state.lock().take() {
        backend.close();
    };
}

/// Opens a database by name. See the module documentation for the format.
///
/// # Safety
///
/// `adb` must be a valid handle; `name` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tcadbopen(adb: *mut TCADB, name: *const c_char) -> bool {
    let Some(a) = handle(adb) else { return false };
    if name.is_null() {
        return false;
    }
    let Ok(name) = CStr::from_ptr(name).to_str() else { return false };
    let mut state = a.state.lock();
    if state.is_some() {
        return false;
    }
    match Backend::open(name) {
        Some(backend) => {
            *state = Some(backend);
            true
        }
        None => false,
    }
}

/// Closes the database.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbclose(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    let backend = a.state.lock().take();
    backend.is_some_and(|b| b.close())
}

/// Stores a record, overwriting any existing value.
///
/// # Safety
///
/// `adb` must be a valid handle; buffers must be readable for their sizes.
#[no_mangle]
pub unsafe extern "C" fn tcadbput(
    adb: *mut TCADB,
    kbuf: *const c_void,
    ksiz: c_int,
    vbuf: *const c_void,
    vsiz: c_int,
) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), PutMode::Over))
}

/// Stores a record unless the key exists.
///
/// # Safety
///
/// `adb` must be a valid handle; buffers must be readable for their sizes.
#[no_mangle]
pub unsafe extern "C" fn tcadbputkeep(
    adb: *mut TCADB,
    kbuf: *const c_void,
    ksiz: c_int,
    vbuf: *const c_void,
    vsiz: c_int,
) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), PutMode::Keep))
}

/// Appends to the value of a record, creating it if missing.
///
/// # Safety
///
/// `adb` must be a valid handle; buffers must be readable for their sizes.
#[no_mangle]
pub unsafe extern "C" fn tcadbputcat(
    adb: *mut TCADB,
    kbuf: *const c_void,
    ksiz: c_int,
    vbuf: *const c_void,
    vsiz: c_int,
) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), PutMode::Cat))
}

/// Removes a record.
///
/// # Safety
///
/// `adb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcadbout(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.out(borrow(kbuf, ksiz)))
}

/// Retrieves a record. The result must be released with [`crate::tcfree`].
///
/// # Safety
///
/// `adb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes;
/// `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tcadbget(
    adb: *mut TCADB,
    kbuf: *const c_void,
    ksiz: c_int,
    sp: *mut c_int,
) -> *mut c_void {
    let Some(a) = handle(adb) else { return ptr::null_mut() };
    a.with(ptr::null_mut(), |b| b.get(borrow(kbuf, ksiz), sp))
}

/// Returns the size of a record's value, or -1.
///
/// # Safety
///
/// `adb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcadbvsiz(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int) -> c_int {
    let Some(a) = handle(adb) else { return -1 };
    a.with(-1, |b| b.vsiz(borrow(kbuf, ksiz)))
}

/// Initializes the key iterator.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbiterinit(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.iterinit())
}

/// Returns the next key of the iterator, or null at the end.
///
/// The result must be released with [`crate::tcfree`].
///
/// # Safety
///
/// `adb` must be a valid handle; `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tcadbiternext(adb: *mut TCADB, sp: *mut c_int) -> *mut c_void {
    let Some(a) = handle(adb) else { return ptr::null_mut() };
    a.with(ptr::null_mut(), |b| b.iternext(sp))
}

/// Lists keys starting with a prefix, at most `max` of them (negative for all).
///
/// # Safety
///
/// `adb` must be a valid handle; `pbuf` must be readable for `psiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcadbfwmkeys(adb: *mut TCADB, pbuf: *const c_void, psiz: c_int, max: c_int) -> *mut TCLIST {
    let Some(a) = handle(adb) else { return ptr::null_mut() };
    a.with(ptr::null_mut(), |b| b.fwmkeys(borrow(pbuf, psiz), max))
}

/// Adds to an integer record. Returns `i32::MIN` on failure.
///
/// # Safety
///
/// `adb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcadbaddint(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, num: c_int) -> c_int {
    let Some(a) = handle(adb) else { return c_int::MIN };
    a.with(c_int::MIN, |b| b.addint(borrow(kbuf, ksiz), num))
}

/// Adds to a real-number record. Returns NaN on failure.
///
/// # Safety
///
/// `adb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcadbadddouble(adb: *mut TCADB, kbuf: *const c_void, ksiz: c_int, num: f64) -> f64 {
    let Some(a) = handle(adb) else { return f64::NAN };
    a.with(f64::NAN, |b| b.adddouble(borrow(kbuf, ksiz), num))
}

/// Writes all records to the disk. On-memory databases always succeed.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbsync(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.sync())
}

/// Retunes the database. `params` uses the `key=value#key=value` format of
/// open names and may be null.
///
/// # Safety
///
/// `adb` must be a valid handle; `params` null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tcadboptimize(adb: *mut TCADB, params: *const c_char) -> bool {
    let Some(a) = handle(adb) else { return false };
    let params = if params.is_null() {
        None
    } else {
        match CStr::from_ptr(params).to_str() {
            Ok(p) => Some(p),
            Err(_) => return false,
        }
    };
    a.with(false, |b| b.optimize(params))
}

/// Removes every record.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbvanish(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.vanish())
}

/// Writes a copy of the database to another file.
///
/// # Safety
///
/// `adb` must be a valid handle; `path` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tcadbcopy(adb: *mut TCADB, path: *const c_char) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.copy(path))
}

/// Begins a transaction.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbtranbegin(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.tranbegin())
}

/// Commits the open transaction.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbtrancommit(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.trancommit())
}

/// Aborts the open transaction.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbtranabort(adb: *mut TCADB) -> bool {
    let Some(a) = handle(adb) else { return false };
    a.with(false, |b| b.tranabort())
}

/// Returns the path the database was opened with: the file path, or `*` or
/// `+` for on-memory databases. Null when closed.
///
/// The string is owned by the handle and valid until it is closed.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbpath(adb: *mut TCADB) -> *const c_char {
    let Some(a) = handle(adb) else { return ptr::null() };
    a.with(ptr::null(), |b| b.name.as_ptr())
}

/// Returns the number of records, or 0 when closed.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbrnum(adb: *mut TCADB) -> u64 {
    let Some(a) = handle(adb) else { return 0 };
    a.with(0, |b| b.rnum())
}

/// Returns the size of the database in bytes, or 0 when closed.
///
/// # Safety
///
/// `adb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcadbsize(adb: *mut TCADB) -> u64 {
    let Some(a) = handle(adb) else { return 0 };
    a.with(0, |b| b.size())
}

/// Runs a named command with a list of arguments.
///
/// Supported commands: `put`, `out`, `get`, `putlist`, `outlist`,
/// `getlist`, `iterinit`, `iternext`, `sync`, `optimize`, `vanish`, and
/// `range` on B-trees. Returns a new list of results, or null when the
/// command fails or is unknown.
///
/// # Safety
///
/// `adb` must be a valid handle; `name` a valid C string; `args` a valid
/// list.
#[no_mangle]
pub unsafe extern "C" fn tcadbmisc(adb: *mut TCADB, name: *const c_char, args: *const TCLIST) -> *mut TCLIST {
    let Some(a) = handle(adb) else { return ptr::null_mut() };
    if name.is_null() {
        return ptr::null_mut();
    }
    let Ok(name) = CStr::from_ptr(name).to_str() else { return ptr::null_mut() };
    let args = TCLIST::items(args);
    a.with(ptr::null_mut(), |b| match b.misc(name, args) {
        Some(out) => TCLIST::into_raw(out),
        None => ptr::null_mut(),
    })
}
