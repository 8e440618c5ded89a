//! B-tree database and cursors.
//!
//! Records are kept sorted by the handle's comparator. A key may carry
//! several values, stored in insertion order.

use crate::alloc::{borrow, copy_out};
use crate::cmp::{KeyOrder, TCCMP};
use crate::ecode::*;
use crate::file::{DbFile, FileKind};
use crate::list::TCLIST;
use crate::store::{self, add_double, add_int, merge, Opened, PutMode, Record, Records};
use crate::{BDBCPAFTER, BDBCPBEFORE, BDBCPCURRENT, OPTS_UNCHANGED};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::cmp::Ordering as KeyOrdering;
use std::ffi::{c_char, c_int, c_void};
use std::ptr;

/// A B-tree database handle.
///
/// Create with [`tcbdbnew`], release with [`tcbdbdel`]. The comparator is
/// called with the handle's lock held; it must not call back into the same
/// handle.
pub struct TCBDB {
    state: Mutex<BdbState>,
    ecode: Ecode,
}

// The opaque comparator pointer is supplied by the caller, who guarantees it
// may be used from any thread that uses the handle.
unsafe impl Send for TCBDB {}
unsafe impl Sync for TCBDB {}

struct BdbState {
    order: KeyOrder,
    tuning: TreeTuning,
    cache: (i32, i32),
    xmsiz: i64,
    dfunit: i32,
    db: Option<Opened<Tree>>,
}

impl Default for BdbState {
    fn default() -> Self {
        Self {
            order: KeyOrder::default(),
            tuning: TreeTuning::default(),
            cache: (1024, 512),
            xmsiz: 0,
            dfunit: 0,
            db: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeTuning {
    lmemb: i32,
    nmemb: i32,
    bnum: i64,
    apow: i8,
    fpow: i8,
    opts: u8,
}

impl Default for TreeTuning {
    fn default() -> Self {
        Self {
            lmemb: 128,
            nmemb: 256,
            bnum: 32_749,
            apow: 8,
            fpow: 10,
            opts: 0,
        }
    }
}

impl TreeTuning {
    fn apply(&mut self, lmemb: i32, nmemb: i32, bnum: i64, apow: i8, fpow: i8, opts: u8) {
        if lmemb > 0 {
            self.lmemb = lmemb;
        }
        if nmemb > 0 {
            self.nmemb = nmemb;
        }
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

/// Sorted records of a B-tree. Every record holds at least one value.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tree {
    recs: Vec<Record>,
}

impl Records for Tree {
    const KIND: FileKind = FileKind::Tree;

    fn snapshot(&self) -> Cow<'_, [Record]> {
        Cow::Borrowed(&self.recs)
    }

    fn rnum(&self) -> u64 {
        self.recs.iter().map(|r| r.vals.len() as u64).sum()
    }
}

impl Tree {
    fn load(mut recs: Vec<Record>, order: &KeyOrder) -> Self {
        recs.retain(|r| !r.vals.is_empty());
        recs.sort_by(|a, b| order.compare(&a.key, &b.key));
        // Keys written under another comparator may now collide.
        let mut merged: Vec<Record> = Vec::with_capacity(recs.len());
        for rec in recs {
            match merged.last_mut() {
                Some(last) if order.compare(&last.key, &rec.key) == KeyOrdering::Equal => {
                    last.vals.extend(rec.vals);
                }
                _ => merged.push(rec),
            }
        }
        Self { recs: merged }
    }

    fn find(&self, order: &KeyOrder, key: &[u8]) -> Result<usize, usize> {
        self.recs.binary_search_by(|r| order.compare(&r.key, key))
    }

    fn lower_bound(&self, order: &KeyOrder, key: &[u8]) -> usize {
        self.find(order, key).unwrap_or_else(|i| i)
    }

    fn get(&self, order: &KeyOrder, key: &[u8]) -> Option<&Record> {
        self.find(order, key).ok().map(|i| &self.recs[i])
    }

    fn put(&mut self, order: &KeyOrder, key: &[u8], val: &[u8], mode: PutMode) -> Result<(), c_int> {
        match self.find(order, key) {
            Ok(i) if mode == PutMode::Dup => self.recs[i].vals.push(val.to_vec()),
            Ok(i) => merge(&mut self.recs[i].vals[0], val, mode)?,
            Err(i) => self.recs.insert(
                i,
                Record {
                    key: key.to_vec(),
                    vals: vec![val.to_vec()],
                },
            ),
        }
        Ok(())
    }

    fn set_first(&mut self, order: &KeyOrder, key: &[u8], val: Vec<u8>) {
        match self.find(order, key) {
            Ok(i) => self.recs[i].vals[0] = val,
            Err(i) => self.recs.insert(
                i,
                Record {
                    key: key.to_vec(),
                    vals: vec![val],
                },
            ),
        }
    }

    fn out(&mut self, order: &KeyOrder, key: &[u8], all: bool) -> Result<(), c_int> {
        let i = self.find(order, key).map_err(|_| TCENOREC)?;
        if all || self.recs[i].vals.len() == 1 {
            self.recs.remove(i);
        } else {
            self.recs[i].vals.remove(0);
        }
        Ok(())
    }
}

impl TCBDB {
    fn run<T>(&self, fail: T, f: impl FnOnce(&mut BdbState) -> Result<T, c_int>) -> T {
        let mut state = self.state.lock();
        match f(&mut state) {
            Ok(v) => v,
            Err(ecode) => {
                self.ecode.set(ecode);
                fail
            }
        }
    }

    fn with_tree<T>(&self, fail: T, f: impl FnOnce(&mut Opened<Tree>, &KeyOrder) -> Result<T, c_int>) -> T {
        self.run(fail, |state| {
            let BdbState { order, db, .. } = state;
            f(db.as_mut().ok_or(TCEINVALID)?, order)
        })
    }

    fn with_writer<T>(&self, fail: T, f: impl FnOnce(&mut Tree, &KeyOrder) -> Result<T, c_int>) -> T {
        self.with_tree(fail, |db, order| {
            db.require_writer()?;
            f(&mut db.recs, order)
        })
    }

    fn with_closed(&self, f: impl FnOnce(&mut BdbState)) -> bool {
        self.run(false, |state| {
            if state.db.is_some() {
                return Err(TCEINVALID);
            }
            f(state);
            Ok(true)
        })
    }

    fn put(&self, key: &[u8], val: &[u8], mode: PutMode) -> bool {
        self.with_writer(false, |tree, order| tree.put(order, key, val, mode).map(|_| true))
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

unsafe fn handle<'a>(bdb: *mut TCBDB) -> Option<&'a TCBDB> {
    bdb.cast_const().as_ref()
}

/// Creates a B-tree database handle ordered lexically.
#[no_mangle]
pub extern "C" fn tcbdbnew() -> *mut TCBDB {
    Box::into_raw(Box::new(TCBDB {
        state: Mutex::new(BdbState::default()),
        ecode: Ecode::default(),
    }))
}

/// Deletes a B-tree database handle, closing it first if open.
///
/// # Safety
///
/// `bdb` must be null or a handle from [`tcbdbnew`] that is not used
/// afterwards. Every cursor created on it must already be deleted.
#[no_mangle]
pub unsafe extern "C" fn tcbdbdel(bdb: *mut TCBDB) {
    if bdb.is_null() {
        return;
    }
    let bdb = Box::from_raw(bdb);
    let mut state = bdb.state.lock();
    if let Some(db) = state.db.take() {
        let _ = db.close();
    }
}

/// Returns the last error code of a handle.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbecode(bdb: *mut TCBDB) -> c_int {
    handle(bdb).map_or(TCEINVALID, |b| b.ecode.get())
}

/// Enables the internal mutex and per-thread error codes. Must be called
/// before opening.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbsetmutex(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_closed(|_| b.ecode.make_per_thread())
}

/// Sets the key comparator. Must be called before opening.
///
/// `op` is passed to every call of `cmp`.
///
/// # Safety
///
/// `bdb` must be a valid handle. `op` must stay valid for as long as `cmp`
/// is installed on the handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbsetcmpfunc(bdb: *mut TCBDB, cmp: TCCMP, op: *mut c_void) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_closed(|state| state.order = KeyOrder::new(cmp, op))
}

/// Sets tuning parameters. Non-positive values and `0xff` options keep the
/// current setting.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbtune(
    bdb: *mut TCBDB,
    lmemb: i32,
    nmemb: i32,
    bnum: i64,
    apow: i8,
    fpow: i8,
    opts: u8,
) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_closed(|state| state.tuning.apply(lmemb, nmemb, bnum, apow, fpow, opts))
}

/// Sets the leaf and non-leaf node cache sizes.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbsetcache(bdb: *mut TCBDB, lcnum: i32, ncnum: i32) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_closed(|state| {
        if lcnum > 0 {
            state.cache.0 = lcnum;
        }
        if ncnum > 0 {
            state.cache.1 = ncnum;
        }
    })
}

/// Sets the extra mapped memory size.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbsetxmsiz(bdb: *mut TCBDB, xmsiz: i64) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_closed(|state| state.xmsiz = xmsiz.max(0))
}

/// Sets the auto defragmentation unit.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbsetdfunit(bdb: *mut TCBDB, dfunit: i32) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_closed(|state| state.dfunit = dfunit.max(0))
}

/// Opens a database file.
///
/// # Safety
///
/// `bdb` must be a valid handle; `path` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tcbdbopen(bdb: *mut TCBDB, path: *const c_char, omode: c_int) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.run(false, |state| {
        if state.db.is_some() {
            return Err(TCEINVALID);
        }
        let (path, cpath) = store::path_arg(path)?;
        let (file, records, opts) = DbFile::open(path, omode, FileKind::Tree)?;
        let tree = Tree::load(records, &state.order);
        let opts = if opts != 0 { opts } else { state.tuning.opts };
        state.db = Some(Opened::file(cpath, file, tree, opts));
        Ok(true)
    })
}

/// Closes a database, writing its records out.
///
/// An open transaction is aborted.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbclose(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.run(false, |state| {
        let db = state.db.take().ok_or(TCEINVALID)?;
        db.close().map_err(|_| TCECLOSE)?;
        Ok(true)
    })
}

macro_rules! put_fn {
    ($(#[$doc:meta])* $name:ident, $mode:expr) => {
        $(#[$doc])*
        ///
        /// # Safety
        ///
        /// `bdb` must be a valid handle; buffers must be readable for their sizes.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            bdb: *mut TCBDB,
            kbuf: *const c_void,
            ksiz: c_int,
            vbuf: *const c_void,
            vsiz: c_int,
        ) -> bool {
            handle(bdb).is_some_and(|b| b.put(borrow(kbuf, ksiz), borrow(vbuf, vsiz), $mode))
        }
    };
}

put_fn!(
    /// Stores a record, overwriting the first value of an existing key.
    tcbdbput,
    PutMode::Over
);
put_fn!(
    /// Stores a record unless the key exists (`TCEKEEP`).
    tcbdbputkeep,
    PutMode::Keep
);
put_fn!(
    /// Appends to the first value of a record, creating it if missing.
    tcbdbputcat,
    PutMode::Cat
);
put_fn!(
    /// Adds a value after the existing values of a key.
    tcbdbputdup,
    PutMode::Dup
);

/// Adds every element of `vals` as a value of a key.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes;
/// `vals` must be a valid list.
#[no_mangle]
pub unsafe extern "C" fn tcbdbputdup3(
    bdb: *mut TCBDB,
    kbuf: *const c_void,
    ksiz: c_int,
    vals: *const TCLIST,
) -> bool {
    let Some(b) = handle(bdb) else { return false };
    let key = borrow(kbuf, ksiz);
    let vals = TCLIST::items(vals);
    b.with_writer(false, |tree, order| {
        for val in vals {
            tree.put(order, key, val, PutMode::Dup)?;
        }
        Ok(true)
    })
}

/// Removes the first value of a key.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbout(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> bool {
    let Some(b) = handle(bdb) else { return false };
    let key = borrow(kbuf, ksiz);
    b.with_writer(false, |tree, order| tree.out(order, key, false).map(|_| true))
}

/// Removes every value of a key.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbout3(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> bool {
    let Some(b) = handle(bdb) else { return false };
    let key = borrow(kbuf, ksiz);
    b.with_writer(false, |tree, order| tree.out(order, key, true).map(|_| true))
}

/// Retrieves the first value of a key. The result must be released with
/// [`crate::tcfree`].
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes;
/// `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tcbdbget(
    bdb: *mut TCBDB,
    kbuf: *const c_void,
    ksiz: c_int,
    sp: *mut c_int,
) -> *mut c_void {
    let Some(b) = handle(bdb) else { return ptr::null_mut() };
    let key = borrow(kbuf, ksiz);
    b.with_tree(ptr::null_mut(), |db, order| {
        let rec = db.recs.get(order, key).ok_or(TCENOREC)?;
        Ok(copy_out(&rec.vals[0], sp))
    })
}

/// Retrieves every value of a key as a list, or null if the key is missing.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbget4(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> *mut TCLIST {
    let Some(b) = handle(bdb) else { return ptr::null_mut() };
    let key = borrow(kbuf, ksiz);
    b.with_tree(ptr::null_mut(), |db, order| {
        let rec = db.recs.get(order, key).ok_or(TCENOREC)?;
        Ok(TCLIST::into_raw(rec.vals.clone()))
    })
}

/// Returns the number of values of a key, or -1 if it is missing.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbvnum(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> c_int {
    let Some(b) = handle(bdb) else { return -1 };
    let key = borrow(kbuf, ksiz);
    b.with_tree(-1, |db, order| {
        let rec = db.recs.get(order, key).ok_or(TCENOREC)?;
        Ok(rec.vals.len() as c_int)
    })
}

/// Returns the size of the first value of a key, or -1 if it is missing.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbvsiz(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int) -> c_int {
    let Some(b) = handle(bdb) else { return -1 };
    let key = borrow(kbuf, ksiz);
    b.with_tree(-1, |db, order| {
        let rec = db.recs.get(order, key).ok_or(TCENOREC)?;
        Ok(rec.vals[0].len() as c_int)
    })
}

/// Lists keys between two bounds, at most `max` of them (negative for all).
///
/// A null bound is open. Each bound is inclusive when its flag is set.
///
/// # Safety
///
/// `bdb` must be a valid handle; non-null bounds must be readable for their
/// sizes.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn tcbdbrange(
    bdb: *mut TCBDB,
    bkbuf: *const c_void,
    bksiz: c_int,
    binc: bool,
    ekbuf: *const c_void,
    eksiz: c_int,
    einc: bool,
    max: c_int,
) -> *mut TCLIST {
    let Some(b) = handle(bdb) else { return ptr::null_mut() };
    let begin = (!bkbuf.is_null()).then(|| borrow(bkbuf, bksiz));
    let end = (!ekbuf.is_null()).then(|| borrow(ekbuf, eksiz));
    let limit = usize::try_from(max).unwrap_or(usize::MAX);
    b.with_tree(ptr::null_mut(), |db, order| {
        let tree = &db.recs;
        let start = match begin {
            None => 0,
            Some(key) => match tree.find(order, key) {
                Ok(i) if binc => i,
                Ok(i) => i + 1,
                Err(i) => i,
            },
        };
        let keys = tree.recs[start.min(tree.recs.len())..]
            .iter()
            .take_while(|r| match end {
                None => true,
                Some(end) => match order.compare(&r.key, end) {
                    KeyOrdering::Less => true,
                    KeyOrdering::Equal => einc,
                    KeyOrdering::Greater => false,
                },
            })
            .take(limit)
            .map(|r| r.key.clone())
            .collect();
        Ok(TCLIST::into_raw(keys))
    })
}

/// Lists keys starting with a prefix, at most `max` of them (negative for all).
///
/// # Safety
///
/// `bdb` must be a valid handle; `pbuf` must be readable for `psiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbfwmkeys(
    bdb: *mut TCBDB,
    pbuf: *const c_void,
    psiz: c_int,
    max: c_int,
) -> *mut TCLIST {
    let Some(b) = handle(bdb) else { return ptr::null_mut() };
    let prefix = borrow(pbuf, psiz);
    let limit = usize::try_from(max).unwrap_or(usize::MAX);
    // Prefixed keys are only contiguous under lexical order, so scan them all.
    b.with_tree(ptr::null_mut(), |db, _| {
        let keys = db
            .recs
            .recs
            .iter()
            .filter(|r| r.key.starts_with(prefix))
            .take(limit)
            .map(|r| r.key.clone())
            .collect();
        Ok(TCLIST::into_raw(keys))
    })
}

/// Adds to an integer record. Returns `i32::MIN` on failure.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbaddint(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, num: c_int) -> c_int {
    let Some(b) = handle(bdb) else { return c_int::MIN };
    let key = borrow(kbuf, ksiz);
    b.with_writer(c_int::MIN, |tree, order| {
        let current = tree.get(order, key).map(|r| r.vals[0].as_slice());
        let sum = add_int(current, num)?;
        tree.set_first(order, key, sum.to_ne_bytes().to_vec());
        Ok(sum)
    })
}

/// Adds to a real-number record. Returns NaN on failure.
///
/// # Safety
///
/// `bdb` must be a valid handle; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbadddouble(bdb: *mut TCBDB, kbuf: *const c_void, ksiz: c_int, num: f64) -> f64 {
    let Some(b) = handle(bdb) else { return f64::NAN };
    let key = borrow(kbuf, ksiz);
    b.with_writer(f64::NAN, |tree, order| {
        let current = tree.get(order, key).map(|r| r.vals[0].as_slice());
        let sum = add_double(current, num)?;
        tree.set_first(order, key, sum.to_ne_bytes().to_vec());
        Ok(sum)
    })
}

/// Writes all records to the disk.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbsync(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_tree(false, |db, _| db.sync().map(|_| true))
}

/// Retunes an open database and rewrites its file.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdboptimize(
    bdb: *mut TCBDB,
    lmemb: i32,
    nmemb: i32,
    bnum: i64,
    apow: i8,
    fpow: i8,
    opts: u8,
) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.run(false, |state| {
        let db = state.db.as_mut().ok_or(TCEINVALID)?;
        db.require_writer()?;
        state.tuning.apply(lmemb, nmemb, bnum, apow, fpow, opts);
        db.opts = state.tuning.opts;
        db.flush()?;
        Ok(true)
    })
}

/// Removes every record.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbvanish(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_writer(false, |tree, _| {
        tree.recs.clear();
        Ok(true)
    })
}

/// Writes a copy of the database to another file.
///
/// # Safety
///
/// `bdb` must be a valid handle; `path` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcopy(bdb: *mut TCBDB, path: *const c_char) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_tree(false, |db, _| {
        let (path, _) = store::path_arg(path)?;
        db.copy(path).map(|_| true)
    })
}

/// Begins a transaction.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbtranbegin(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_tree(false, |db, _| db.begin().map(|_| true))
}

/// Commits the open transaction.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbtrancommit(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_tree(false, |db, _| db.commit().map(|_| true))
}

/// Aborts the open transaction.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbtranabort(bdb: *mut TCBDB) -> bool {
    let Some(b) = handle(bdb) else { return false };
    b.with_tree(false, |db, _| db.abort().map(|_| true))
}

/// Returns the file path of an open database.
///
/// The string is owned by the handle and valid until it is closed. Returns
/// null for closed and on-memory databases.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbpath(bdb: *mut TCBDB) -> *const c_char {
    let Some(b) = handle(bdb) else { return ptr::null() };
    b.with_tree(ptr::null(), |db, _| db.path().map(|p| p.as_ptr()).ok_or(TCEINVALID))
}

/// Returns the number of stored values, or 0 on failure.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbrnum(bdb: *mut TCBDB) -> u64 {
    let Some(b) = handle(bdb) else { return 0 };
    b.with_tree(0, |db, _| Ok(db.recs.rnum()))
}

/// Returns the size of the database file, or 0 on failure.
///
/// # Safety
///
/// `bdb` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn tcbdbfsiz(bdb: *mut TCBDB) -> u64 {
    let Some(b) = handle(bdb) else { return 0 };
    b.with_tree(0, |db, _| db.fsiz())
}

/// A cursor over a B-tree database.
///
/// Create with [`tcbdbcurnew`], release with [`tcbdbcurdel`]. The cursor
/// remembers its key, so it survives modifications of the database: if its
/// record is removed, it moves to the next record in order.
pub struct BDBCUR {
    bdb: *mut TCBDB,
    pos: CurPos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CurPos {
    Unset,
    At { key: Vec<u8>, vidx: usize },
    PastEnd,
    PastBegin,
}

/// Where a cursor's position lands in the current records.
enum Landing {
    Exact(usize, usize),
    /// The record was removed; the index is its successor.
    Moved(usize),
    End,
    Invalid,
}

impl CurPos {
    fn at(rec: &Record, vidx: usize) -> Self {
        CurPos::At {
            key: rec.key.clone(),
            vidx,
        }
    }

    fn land(&self, tree: &Tree, order: &KeyOrder) -> Landing {
        let CurPos::At { key, vidx } = self else {
            return Landing::Invalid;
        };
        match tree.find(order, key) {
            Ok(i) => Landing::Exact(i, (*vidx).min(tree.recs[i].vals.len() - 1)),
            Err(i) if i < tree.recs.len() => Landing::Moved(i),
            Err(_) => Landing::End,
        }
    }

    /// Resolves the position to a value, moving off a removed record.
    fn settle(&mut self, tree: &Tree, order: &KeyOrder) -> Result<(usize, usize), c_int> {
        match self.land(tree, order) {
            Landing::Exact(i, v) => Ok((i, v)),
            Landing::Moved(i) => {
                *self = CurPos::at(&tree.recs[i], 0);
                Ok((i, 0))
            }
            Landing::End => {
                *self = CurPos::PastEnd;
                Err(TCENOREC)
            }
            Landing::Invalid => Err(TCENOREC),
        }
    }
}

unsafe fn with_cursor<T>(
    cur: *mut BDBCUR,
    fail: T,
    write: bool,
    f: impl FnOnce(&mut CurPos, &mut Tree, &KeyOrder) -> Result<T, c_int>,
) -> T {
    let Some(cur) = cur.as_mut() else { return fail };
    let Some(b) = handle(cur.bdb) else { return fail };
    b.with_tree(fail, |db, order| {
        if write {
            db.require_writer()?;
        }
        f(&mut cur.pos, &mut db.recs, order)
    })
}

/// Creates a cursor on a database.
///
/// # Safety
///
/// `bdb` must be a valid handle that outlives the cursor.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurnew(bdb: *mut TCBDB) -> *mut BDBCUR {
    if bdb.is_null() {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(BDBCUR {
        bdb,
        pos: CurPos::Unset,
    }))
}

/// Deletes a cursor.
///
/// # Safety
///
/// `cur` must be null or a cursor from [`tcbdbcurnew`] not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurdel(cur: *mut BDBCUR) {
    if !cur.is_null() {
        drop(Box::from_raw(cur));
    }
}

/// Moves a cursor to the first record.
///
/// # Safety
///
/// `cur` must be a valid cursor.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurfirst(cur: *mut BDBCUR) -> bool {
    with_cursor(cur, false, false, |pos, tree, _| {
        let Some(rec) = tree.recs.first() else {
            *pos = CurPos::Unset;
            return Err(TCENOREC);
        };
        *pos = CurPos::at(rec, 0);
        Ok(true)
    })
}

/// Moves a cursor to the last value of the last record.
///
/// # Safety
///
/// `cur` must be a valid cursor.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurlast(cur: *mut BDBCUR) -> bool {
    with_cursor(cur, false, false, |pos, tree, _| {
        let Some(rec) = tree.recs.last() else {
            *pos = CurPos::Unset;
            return Err(TCENOREC);
        };
        *pos = CurPos::at(rec, rec.vals.len() - 1);
        Ok(true)
    })
}

/// Moves a cursor to the first record whose key is not less than `kbuf`.
///
/// # Safety
///
/// `cur` must be a valid cursor; `kbuf` must be readable for `ksiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurjump(cur: *mut BDBCUR, kbuf: *const c_void, ksiz: c_int) -> bool {
    let key = borrow(kbuf, ksiz);
    with_cursor(cur, false, false, |pos, tree, order| {
        match tree.recs.get(tree.lower_bound(order, key)) {
            Some(rec) => {
                *pos = CurPos::at(rec, 0);
                Ok(true)
            }
            None => {
                *pos = CurPos::PastEnd;
                Err(TCENOREC)
            }
        }
    })
}

/// Moves a cursor to the next value.
///
/// # Safety
///
/// `cur` must be a valid cursor.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurnext(cur: *mut BDBCUR) -> bool {
    with_cursor(cur, false, false, |pos, tree, order| {
        let next = match pos.land(tree, order) {
            Landing::Exact(i, v) if v + 1 < tree.recs[i].vals.len() => Some((i, v + 1)),
            Landing::Exact(i, _) if i + 1 < tree.recs.len() => Some((i + 1, 0)),
            Landing::Exact(..) | Landing::End => None,
            Landing::Moved(i) => Some((i, 0)),
            Landing::Invalid => return Err(TCENOREC),
        };
        match next {
            Some((i, v)) => {
                *pos = CurPos::at(&tree.recs[i], v);
                Ok(true)
            }
            None => {
                *pos = CurPos::PastEnd;
                Err(TCENOREC)
            }
        }
    })
}

/// Moves a cursor to the previous value.
///
/// # Safety
///
/// `cur` must be a valid cursor.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurprev(cur: *mut BDBCUR) -> bool {
    with_cursor(cur, false, false, |pos, tree, order| {
        let last_of = |i: usize| (i, tree.recs[i].vals.len() - 1);
        let prev = match pos.land(tree, order) {
            Landing::Exact(i, v) if v > 0 => Some((i, v - 1)),
            Landing::Exact(i, _) | Landing::Moved(i) if i > 0 => Some(last_of(i - 1)),
            Landing::Exact(..) | Landing::Moved(_) => None,
            Landing::End => tree.recs.len().checked_sub(1).map(last_of),
            Landing::Invalid => return Err(TCENOREC),
        };
        match prev {
            Some((i, v)) => {
                *pos = CurPos::at(&tree.recs[i], v);
                Ok(true)
            }
            None => {
                *pos = CurPos::PastBegin;
                Err(TCENOREC)
            }
        }
    })
}

/// Stores a value at the cursor position.
///
/// `cpmode` is one of [`BDBCPCURRENT`], [`BDBCPBEFORE`] or [`BDBCPAFTER`];
/// the cursor ends on the stored value.
///
/// # Safety
///
/// `cur` must be a valid cursor; `vbuf` must be readable for `vsiz` bytes.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurput(cur: *mut BDBCUR, vbuf: *const c_void, vsiz: c_int, cpmode: c_int) -> bool {
    let val = borrow(vbuf, vsiz).to_vec();
    with_cursor(cur, false, true, |pos, tree, order| {
        let (i, v) = pos.settle(tree, order)?;
        let vals = &mut tree.recs[i].vals;
        let vidx = match cpmode {
            BDBCPCURRENT => {
                vals[v] = val;
                v
            }
            BDBCPBEFORE => {
                vals.insert(v, val);
                v
            }
            BDBCPAFTER => {
                vals.insert(v + 1, val);
                v + 1
            }
            _ => return Err(TCEINVALID),
        };
        *pos = CurPos::at(&tree.recs[i], vidx);
        Ok(true)
    })
}

/// Removes the value at the cursor position and moves to the next value.
///
/// # Safety
///
/// `cur` must be a valid cursor.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurout(cur: *mut BDBCUR) -> bool {
    with_cursor(cur, false, true, |pos, tree, order| {
        let (i, v) = pos.settle(tree, order)?;
        tree.recs[i].vals.remove(v);
        let next = if tree.recs[i].vals.is_empty() {
            tree.recs.remove(i);
            (i < tree.recs.len()).then_some((i, 0))
        } else if v < tree.recs[i].vals.len() {
            Some((i, v))
        } else {
            (i + 1 < tree.recs.len()).then_some((i + 1, 0))
        };
        *pos = match next {
            Some((i, v)) => CurPos::at(&tree.recs[i], v),
            None => CurPos::PastEnd,
        };
        Ok(true)
    })
}

/// Returns the key at the cursor position. The result must be released with
/// [`crate::tcfree`].
///
/// # Safety
///
/// `cur` must be a valid cursor; `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurkey(cur: *mut BDBCUR, sp: *mut c_int) -> *mut c_void {
    with_cursor(cur, ptr::null_mut(), false, |pos, tree, order| {
        let (i, _) = pos.settle(tree, order)?;
        Ok(copy_out(&tree.recs[i].key, sp))
    })
}

/// Returns the value at the cursor position. The result must be released
/// with [`crate::tcfree`].
///
/// # Safety
///
/// `cur` must be a valid cursor; `sp` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn tcbdbcurval(cur: *mut BDBCUR, sp: *mut c_int) -> *mut c_void {
    with_cursor(cur, ptr::null_mut(), false, |pos, tree, order| {
        let (i, v) = pos.settle(tree, order)?;
        Ok(copy_out(&tree.recs[i].vals[v], sp))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tccmpint32, tcfree, tclistdel, tclistnum, tclistval, BDBOCREAT, BDBOREADER, BDBOWRITER};
    use std::ffi::CString;
    use tempfile::TempDir;

    fn memory() -> *mut TCBDB {
        let b = tcbdbnew();
        assert!(unsafe { (*b).open_memory() });
        b
    }

    unsafe fn put(b: *mut TCBDB, k: &[u8], v: &[u8]) -> bool {
        tcbdbput(b, k.as_ptr().cast(), k.len() as c_int, v.as_ptr().cast(), v.len() as c_int)
    }

    unsafe fn putdup(b: *mut TCBDB, k: &[u8], v: &[u8]) -> bool {
        tcbdbputdup(b, k.as_ptr().cast(), k.len() as c_int, v.as_ptr().cast(), v.len() as c_int)
    }

    unsafe fn take(buf: *mut c_void, len: c_int) -> Option<Vec<u8>> {
        if buf.is_null() {
            return None;
        }
        let out = borrow(buf, len).to_vec();
        tcfree(buf);
        Some(out)
    }

    unsafe fn list(l: *mut TCLIST) -> Vec<Vec<u8>> {
        let out = TCLIST::items(l).to_vec();
        tclistdel(l);
        out
    }

    unsafe fn cur_key(c: *mut BDBCUR) -> Option<Vec<u8>> {
        let mut len = 0;
        take(tcbdbcurkey(c, &mut len), len)
    }

    unsafe fn cur_val(c: *mut BDBCUR) -> Option<Vec<u8>> {
        let mut len = 0;
        take(tcbdbcurval(c, &mut len), len)
    }

    #[test]
    fn duplicates_and_counts() {
        unsafe {
            let b = memory();
            assert!(putdup(b, b"k", b"1"));
            assert!(putdup(b, b"k", b"2"));
            assert!(put(b, b"j", b"x"));
            assert_eq!(tcbdbvnum(b, b"k".as_ptr().cast(), 1), 2);
            assert_eq!(tcbdbrnum(b), 3);

            let vals = list(tcbdbget4(b, b"k".as_ptr().cast(), 1));
            assert_eq!(vals, vec![b"1".to_vec(), b"2".to_vec()]);

            assert!(tcbdbout(b, b"k".as_ptr().cast(), 1));
            assert_eq!(tcbdbvnum(b, b"k".as_ptr().cast(), 1), 1);
            assert!(tcbdbout3(b, b"k".as_ptr().cast(), 1));
            assert_eq!(tcbdbvnum(b, b"k".as_ptr().cast(), 1), -1);
            assert_eq!(tcbdbecode(b), TCENOREC);
            assert!(tcbdbget4(b, b"k".as_ptr().cast(), 1).is_null());
            tcbdbdel(b);
        }
    }

    #[test]
    fn putdup3_appends_list() {
        unsafe {
            let b = memory();
            let vals = TCLIST::into_raw(vec![b"a".to_vec(), b"b".to_vec()]);
            assert!(tcbdbputdup3(b, b"k".as_ptr().cast(), 1, vals));
            tclistdel(vals);
            assert_eq!(tcbdbvnum(b, b"k".as_ptr().cast(), 1), 2);
            tcbdbdel(b);
        }
    }

    #[test]
    fn range_bounds() {
        unsafe {
            let b = memory();
            for k in [&b"a"[..], b"b", b"c", b"d"] {
                assert!(put(b, k, b""));
            }
            let keys = list(tcbdbrange(b, b"b".as_ptr().cast(), 1, false, b"d".as_ptr().cast(), 1, true, -1));
            assert_eq!(keys, vec![b"c".to_vec(), b"d".to_vec()]);

            let keys = list(tcbdbrange(b, ptr::null(), 0, true, ptr::null(), 0, true, 2));
            assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

            let l = tcbdbfwmkeys(b, b"c".as_ptr().cast(), 1, -1);
            assert_eq!(tclistnum(l), 1);
            let mut len = 0;
            assert_eq!(borrow(tclistval(l, 0, &mut len), len), b"c");
            tclistdel(l);
            tcbdbdel(b);
        }
    }

    #[test]
    fn custom_order() {
        unsafe {
            let b = tcbdbnew();
            assert!(tcbdbsetcmpfunc(b, tccmpint32, ptr::null_mut()));
            assert!((*b).open_memory());
            for n in [300i32, -1, 2] {
                assert!(put(b, &n.to_ne_bytes(), b""));
            }
            let keys = list(tcbdbrange(b, ptr::null(), 0, true, ptr::null(), 0, true, -1));
            let nums: Vec<i32> = keys
                .iter()
                .map(|k| i32::from_ne_bytes(k.as_slice().try_into().unwrap()))
                .collect();
            assert_eq!(nums, vec![-1, 2, 300]);

            assert!(!tcbdbsetcmpfunc(b, tccmpint32, ptr::null_mut()));
            assert_eq!(tcbdbecode(b), TCEINVALID);
            tcbdbdel(b);
        }
    }

    #[test]
    fn cursor_walks_values_in_order() {
        unsafe {
            let b = memory();
            assert!(putdup(b, b"a", b"1"));
            assert!(putdup(b, b"a", b"2"));
            assert!(put(b, b"b", b"3"));

            let c = tcbdbcurnew(b);
            assert!(tcbdbcurfirst(c));
            let mut seen = Vec::new();
            loop {
                seen.push((cur_key(c).unwrap(), cur_val(c).unwrap()));
                if !tcbdbcurnext(c) {
                    break;
                }
            }
            assert_eq!(tcbdbecode(b), TCENOREC);
            assert_eq!(
                seen,
                vec![
                    (b"a".to_vec(), b"1".to_vec()),
                    (b"a".to_vec(), b"2".to_vec()),
                    (b"b".to_vec(), b"3".to_vec()),
                ]
            );

            assert!(tcbdbcurlast(c));
            assert!(tcbdbcurprev(c));
            assert_eq!(cur_val(c).unwrap(), b"2");
            assert!(tcbdbcurprev(c));
            assert!(!tcbdbcurprev(c));
            assert!(cur_key(c).is_none());

            tcbdbcurdel(c);
            tcbdbdel(b);
        }
    }

    #[test]
    fn cursor_survives_removal() {
        unsafe {
            let b = memory();
            for k in [&b"a"[..], b"b", b"c"] {
                assert!(put(b, k, k));
            }
            let c = tcbdbcurnew(b);
            assert!(tcbdbcurjump(c, b"b".as_ptr().cast(), 1));
            assert!(tcbdbout(b, b"b".as_ptr().cast(), 1));
            assert_eq!(cur_key(c).unwrap(), b"c");

            assert!(tcbdbcurjump(c, b"bb".as_ptr().cast(), 2));
            assert_eq!(cur_key(c).unwrap(), b"c");
            assert!(!tcbdbcurjump(c, b"z".as_ptr().cast(), 1));
            assert!(!tcbdbcurnext(c));
            tcbdbcurdel(c);
            tcbdbdel(b);
        }
    }

    #[test]
    fn cursor_put_and_out() {
        unsafe {
            let b = memory();
            assert!(put(b, b"k", b"mid"));
            let c = tcbdbcurnew(b);
            assert!(!tcbdbcurput(c, b"x".as_ptr().cast(), 1, BDBCPCURRENT));

            assert!(tcbdbcurfirst(c));
            assert!(tcbdbcurput(c, b"pre".as_ptr().cast(), 3, BDBCPBEFORE));
            assert_eq!(cur_val(c).unwrap(), b"pre");
            assert!(tcbdbcurnext(c));
            assert!(tcbdbcurput(c, b"post".as_ptr().cast(), 4, BDBCPAFTER));
            assert!(tcbdbcurput(c, b"last".as_ptr().cast(), 4, BDBCPCURRENT));
            let vals = list(tcbdbget4(b, b"k".as_ptr().cast(), 1));
            assert_eq!(vals, vec![b"pre".to_vec(), b"mid".to_vec(), b"last".to_vec()]);

            assert!(tcbdbcurfirst(c));
            assert!(tcbdbcurout(c));
            assert_eq!(cur_val(c).unwrap(), b"mid");
            assert!(tcbdbcurout(c));
            assert!(tcbdbcurout(c));
            assert!(!tcbdbcurout(c));
            assert_eq!(tcbdbrnum(b), 0);
            tcbdbcurdel(c);
            tcbdbdel(b);
        }
    }

    #[test]
    fn file_roundtrip_keeps_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = CString::new(dir.path().join("db.tcb").to_str().unwrap()).unwrap();
        unsafe {
            let b = tcbdbnew();
            assert!(tcbdbopen(b, path.as_ptr(), BDBOWRITER | BDBOCREAT));
            assert!(putdup(b, b"k", b"1"));
            assert!(putdup(b, b"k", b"2"));
            assert!(tcbdbtranbegin(b));
            assert!(put(b, b"gone", b""));
            assert!(tcbdbclose(b));

            assert!(tcbdbopen(b, path.as_ptr(), BDBOREADER));
            assert_eq!(tcbdbrnum(b), 2);
            assert!(!put(b, b"x", b""));
            assert!(tcbdbfsiz(b) > 0);
            assert!(!tcbdbpath(b).is_null());
            assert!(tcbdbclose(b));
            assert!(!tcbdbclose(b));
            assert_eq!(tcbdbecode(b), TCEINVALID);
            tcbdbdel(b);
        }
    }

    #[test]
    fn addint_accumulates() {
        unsafe {
            let b = memory();
            assert_eq!(tcbdbaddint(b, b"n".as_ptr().cast(), 1, 3), 3);
            assert_eq!(tcbdbaddint(b, b"n".as_ptr().cast(), 1, 4), 7);
            assert_eq!(tcbdbadddouble(b, b"d".as_ptr().cast(), 1, 0.5), 0.5);
            assert!(put(b, b"s", b"str"));
            assert_eq!(tcbdbaddint(b, b"s".as_ptr().cast(), 1, 1), c_int::MIN);
            assert_eq!(tcbdbecode(b), TCEKEEP);
            tcbdbdel(b);
        }
    }
}
